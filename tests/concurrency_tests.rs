#![allow(clippy::unwrap_used, clippy::expect_used)]

use http::Method;
use stagerouter::server::Request;
use stagerouter::{Dispatcher, FilterOptions, FilterStage, RouterConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn quiet() -> Dispatcher {
    Dispatcher::with_config(RouterConfig {
        access_logs: false,
        ..RouterConfig::default()
    })
}

fn static_table() -> Dispatcher {
    let d = quiet();
    for i in 0..50 {
        let body = format!("literal-{i}");
        d.get(&format!("/r{i}/fixed"), move |ctx| ctx.write_text(&body))
            .unwrap();
        d.get(&format!("/r{i}/:id([0-9]+)"), move |ctx| {
            let id = ctx.param("id").unwrap_or_default().to_string();
            ctx.write_text(&format!("param-{i}-{id}"));
        })
        .unwrap();
        d.get(&format!("/r{i}/*"), move |ctx| ctx.write_text(&format!("splat-{i}")))
            .unwrap();
    }
    d
}

#[test]
fn test_concurrent_reads_are_consistent() {
    let d = static_table();
    thread::scope(|s| {
        for t in 0..8 {
            let d = &d;
            s.spawn(move || {
                for n in 0..500 {
                    let i = (n + t) % 50;
                    let fixed = d.serve(Request::new(Method::GET, &format!("/r{i}/fixed")));
                    assert_eq!(fixed.body_str(), format!("literal-{i}"));
                    let param = d.serve(Request::new(Method::GET, &format!("/r{i}/{n}")));
                    assert_eq!(param.body_str(), format!("param-{i}-{n}"));
                    let splat = d.serve(Request::new(Method::GET, &format!("/r{i}/x/y")));
                    assert_eq!(splat.body_str(), format!("splat-{i}"));
                    let miss = d.serve(Request::new(Method::POST, &format!("/r{i}/fixed")));
                    assert_eq!(miss.status, 405);
                }
            });
        }
    });
}

#[test]
fn test_register_and_remove_while_serving() {
    let d = static_table();
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        let writer = s.spawn(|| {
            for round in 0..300 {
                let pattern = format!("/churn/{}", round % 5);
                let body = pattern.clone();
                d.get(&pattern, move |ctx| ctx.write_text(&body)).unwrap();
                d.post("/churn/:id", |ctx| ctx.write_text("posted")).unwrap();
                assert_eq!(d.unregister(&pattern, "get").unwrap(), 1);
                assert_eq!(d.unregister("/churn/:id", "post").unwrap(), 1);
            }
            stop.store(true, Ordering::SeqCst);
        });

        for _ in 0..6 {
            s.spawn(|| {
                let mut n = 0usize;
                while !stop.load(Ordering::SeqCst) {
                    n += 1;
                    let i = n % 50;
                    let stable = d.serve(Request::new(Method::GET, &format!("/r{i}/fixed")));
                    assert_eq!(stable.body_str(), format!("literal-{i}"));

                    let path = format!("/churn/{}", n % 5);
                    let res = d.serve(Request::new(Method::GET, &path));
                    match res.status {
                        200 => assert_eq!(res.body_str(), path),
                        404 | 405 => {}
                        other => panic!("unexpected status {other} for {path}"),
                    }
                }
            });
        }

        writer.join().unwrap();
    });

    assert_eq!(d.serve(Request::new(Method::GET, "/churn/0")).status, 404);
    assert!(d.routes().iter().all(|(_, p)| !p.starts_with("/churn")));
}

#[test]
fn test_filters_change_while_serving() {
    let d = Arc::new(quiet());
    d.get("/ping", |ctx| ctx.write_text("pong")).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let d = Arc::clone(&d);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let res = d.serve(Request::new(Method::GET, "/ping"));
                    assert_eq!(res.status, 200);
                    assert_eq!(res.body_str(), "pong");
                }
            })
        })
        .collect();

    for _ in 0..200 {
        d.insert_filter(
            FilterStage::AfterExec,
            "/*",
            |ctx| ctx.set_header("x-tag", "1"),
            FilterOptions::default().return_on_output(false),
        )
        .unwrap();
        d.remove_filters(FilterStage::AfterExec, "/*");
    }
    stop.store(true, Ordering::SeqCst);
    for r in readers {
        r.join().unwrap();
    }
    assert!(d
        .serve(Request::new(Method::GET, "/ping"))
        .header("x-tag")
        .is_none());
}
