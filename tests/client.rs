use std::cell::Cell;
use std::net::TcpListener;
use std::rc::Rc;
use std::time::Duration;

use httpmock::prelude::*;
use httpmock::Method::{HEAD, PATCH};

use curlstack::middleware;
use curlstack::{
    Body, Client, HistoryLog, RedirectPolicy, RequestOptions, TransferInfo,
};

#[test]
fn get_returns_status_headers_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/hello");
        then.status(200)
            .header("content-type", "text/plain")
            .body("hello world");
    });

    let client = Client::new();
    let response = client
        .get(server.url("/hello"))
        .expect("GET should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.body().text(), "hello world");
    mock.assert();
}

#[test]
fn default_user_agent_is_sent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ua")
            .header("user-agent", concat!("curlstack/", env!("CARGO_PKG_VERSION")));
        then.status(204);
    });

    let client = Client::new();
    client.get(server.url("/ua")).expect("GET should succeed");
    mock.assert();
}

#[test]
fn request_headers_and_query_reach_the_server() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/search")
            .query_param("q", "stacks")
            .query_param("page", "2")
            .header("x-team", "transport");
        then.status(200).body("found");
    });

    let client = Client::new();
    let options = RequestOptions::new()
        .with_query_pairs([("q", "stacks"), ("page", "2")])
        .with_header("X-Team", "transport");
    let response = client
        .request(http::Method::GET, server.url("/search"), options)
        .expect("GET should succeed");

    assert_eq!(response.body().text(), "found");
    mock.assert();
}

#[cfg(feature = "json")]
#[test]
fn json_post_round_trips() {
    use serde_json::json;

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/items")
            .header("content-type", "application/json")
            .json_body(json!({"name": "spool"}));
        then.status(201)
            .header("content-type", "application/json")
            .json_body(json!({"id": 7, "name": "spool"}));
    });

    let client = Client::new();
    let response = client
        .post(
            server.url("/items"),
            RequestOptions::new().with_json(json!({"name": "spool"})),
        )
        .expect("POST should succeed");

    assert_eq!(response.status(), 201);
    let decoded: serde_json::Value =
        response.body().json().expect("response should be JSON");
    assert_eq!(decoded, json!({"id": 7, "name": "spool"}));
    mock.assert();
}

#[test]
fn form_post_is_url_encoded() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/form")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=jo&tag=a+b");
        then.status(200);
    });

    let client = Client::new();
    client
        .post(
            server.url("/form"),
            RequestOptions::new().with_form([("name", "jo"), ("tag", "a b")]),
        )
        .expect("POST should succeed");
    mock.assert();
}

#[test]
fn head_response_has_no_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(HEAD).path("/resource");
        then.status(200);
    });

    let client = Client::new();
    let response = client
        .head(server.url("/resource"))
        .expect("HEAD should succeed");

    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
}

#[test]
fn options_requests_pass_through() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(OPTIONS).path("/anything");
        then.status(200).header("allow", "GET, POST");
    });

    let client = Client::new();
    let response = client
        .options(server.url("/anything"))
        .expect("OPTIONS should succeed");

    assert_eq!(response.headers()["allow"], "GET, POST");
    mock.assert();
}

#[test]
fn put_patch_and_delete_reach_the_server() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT).path("/item").body("v2");
        then.status(200);
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH).path("/item").body("v2.1");
        then.status(200);
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/item");
        then.status(204);
    });

    let client = Client::new();
    client
        .put(server.url("/item"), RequestOptions::new().with_body("v2"))
        .expect("PUT should succeed");
    client
        .patch(server.url("/item"), RequestOptions::new().with_body("v2.1"))
        .expect("PATCH should succeed");
    client
        .delete(server.url("/item"))
        .expect("DELETE should succeed");

    put.assert();
    patch.assert();
    delete.assert();
}

#[test]
fn error_status_becomes_bad_response_with_the_full_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).body("not here");
    });

    let client = Client::new();
    let err = client
        .get(server.url("/missing"))
        .expect_err("404 should be rejected");

    assert!(err.is_bad_response());
    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
    assert_eq!(
        err.response().expect("response preserved").body().text(),
        "not here"
    );
    assert!(err.to_string().contains("404"));
}

#[test]
fn http_errors_can_be_disabled_per_request() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(500).body("boom");
    });

    let client = Client::new();
    let response = client
        .request(
            http::Method::GET,
            server.url("/broken"),
            RequestOptions::new().with_http_errors(false),
        )
        .expect("500 should pass through");

    assert_eq!(response.status(), 500);
    assert_eq!(response.body().text(), "boom");
}

#[test]
fn redirects_are_followed_and_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/old");
        then.status(302).header("location", server.url("/new"));
    });
    server.mock(|when, then| {
        when.method(GET).path("/new");
        then.status(200).body("landed");
    });

    let client = Client::new();
    let response = client.get(server.url("/old")).expect("GET should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.body().text(), "landed");

    let info = response
        .extensions()
        .get::<TransferInfo>()
        .expect("transfer info attached");
    assert_eq!(info.redirect_count, 1);
    assert!(info.effective_url.ends_with("/new"));
}

#[test]
fn redirect_policy_none_returns_the_redirect_itself() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/old");
        then.status(302).header("location", "/new");
    });

    let client = Client::new();
    let response = client
        .request(
            http::Method::GET,
            server.url("/old"),
            RequestOptions::new().with_redirects(RedirectPolicy::None),
        )
        .expect("302 is not an error status");

    assert_eq!(response.status(), 302);
    assert_eq!(response.headers()["location"], "/new");
}

#[test]
fn connection_refusal_is_a_network_error() {
    // Grab a port the OS considers free, then close it again.
    let port = {
        let listener =
            TcpListener::bind("127.0.0.1:0").expect("bind throwaway port");
        listener.local_addr().expect("local addr").port()
    };

    let client = Client::new();
    let err = client
        .request(
            http::Method::GET,
            format!("http://127.0.0.1:{port}/"),
            RequestOptions::new().with_connect_timeout(Duration::from_secs(5)),
        )
        .expect_err("nothing is listening");

    assert!(err.is_network(), "expected a network error, got: {err}");
    assert!(!err.is_bad_response());
}

#[test]
fn prepared_requests_are_sent_as_is() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/raw")
            .header("x-prepared", "yes")
            .body("payload");
        then.status(202);
    });

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri(server.url("/raw"))
        .header("X-Prepared", "yes")
        .body(Body::from("payload"))
        .expect("request builds");

    let client = Client::new();
    let response = client.send(request).expect("send should succeed");
    assert_eq!(response.status(), 202);
    mock.assert();
}

#[test]
fn base_url_resolves_against_the_server() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/users");
        then.status(200).body("[]");
    });

    let client = Client::builder()
        .with_base_url(format!("{}/api/", server.base_url()))
        .build()
        .expect("client builds");

    let response = client.get("users").expect("GET should succeed");
    assert_eq!(response.body().text(), "[]");
    mock.assert();
}

#[test]
fn history_middleware_records_real_transfers() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/traced");
        then.status(200).body("ok");
    });

    let log = HistoryLog::new();
    let client = Client::builder()
        .with_middleware(middleware::history(log.clone()), "history")
        .build()
        .expect("client builds");

    client.get(server.url("/traced")).expect("GET should succeed");

    let entries = log.snapshot();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].url.ends_with("/traced"));
    assert_eq!(entries[0].status.map(|s| s.as_u16()), Some(200));
    assert!(entries[0].is_ok());
}

#[test]
fn batch_preserves_input_order() {
    let server = MockServer::start();
    for name in ["a", "b", "c"] {
        server.mock(|when, then| {
            when.method(GET).path(format!("/slot/{name}"));
            then.status(200).body(name);
        });
    }

    let client = Client::new();
    let mut batch = client.batch();
    batch.get(server.url("/slot/a"));
    batch.get(server.url("/slot/b"));
    batch.get(server.url("/slot/c"));

    let results = batch.run().expect("batch should run");
    let bodies: Vec<String> = results
        .into_iter()
        .map(|r| r.expect("each transfer succeeds").body().text())
        .collect();
    assert_eq!(bodies, vec!["a", "b", "c"]);
}

#[test]
fn batch_sends_prepared_requests_alongside_described_ones() {
    let server = MockServer::start();
    let queued = server.mock(|when, then| {
        when.method(GET).path("/queued");
        then.status(200).body("queued");
    });
    let prepared = server.mock(|when, then| {
        when.method(POST).path("/raw").body("payload");
        then.status(201);
    });

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri(server.url("/raw"))
        .body(Body::from("payload"))
        .expect("request builds");

    let client = Client::new();
    let mut batch = client.batch();
    batch.get(server.url("/queued"));
    batch.add_request(request, RequestOptions::new());

    let results = batch.run().expect("batch should run");
    assert_eq!(results.len(), 2);
    let first = results[0].as_ref().expect("described entry");
    assert_eq!(first.body().text(), "queued");
    assert_eq!(results[1].as_ref().expect("prepared entry").status(), 201);
    queued.assert();
    prepared.assert();
}

#[test]
fn batch_reports_through_callbacks() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ok");
        then.status(200).body("fine");
    });
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(410).body("gone");
    });

    let client = Client::new();
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    let mut batch = client
        .batch()
        .on_response(|index, response| {
            succeeded.push((index, response.status().as_u16()))
        })
        .on_error(|index, error| {
            failed.push((index, error.status().map(|s| s.as_u16())))
        });
    batch.get(server.url("/ok"));
    batch.get(server.url("/gone"));
    batch.get("not a url at all");

    batch.for_each().expect("batch should run");

    succeeded.sort_unstable();
    failed.sort_unstable();
    assert_eq!(succeeded, vec![(0, 200)]);
    assert_eq!(failed, vec![(1, Some(410)), (2, None)]);
}

#[test]
fn batch_runs_more_requests_than_the_concurrency_cap() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/burst");
        then.status(200).body("x");
    });

    let client = Client::new();
    let mut batch = client.batch().with_concurrency(3);
    for _ in 0..10 {
        batch.get(server.url("/burst"));
    }

    let results = batch.run().expect("batch should run");
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r.is_ok()));
    mock.assert_hits(10);
}

#[test]
fn batch_keeps_at_most_the_configured_transfers_in_flight() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/steady");
        then.status(200).body("x").delay(Duration::from_millis(25));
    });

    let dispatched = Rc::new(Cell::new(0usize));
    let settled = Rc::new(Cell::new(0usize));
    let peak = Rc::new(Cell::new(0usize));

    // Dispatches minus settlements is the number of live transfers at
    // the moment a new one starts.
    let started = Rc::clone(&dispatched);
    let finished = Rc::clone(&settled);
    let high_water = Rc::clone(&peak);
    let client = Client::builder()
        .with_middleware(
            middleware::tap(move |_request, _options| {
                started.set(started.get() + 1);
                let in_flight = started.get() - finished.get();
                high_water.set(high_water.get().max(in_flight));
            }),
            "gauge",
        )
        .build()
        .expect("client builds");

    let on_ok = Rc::clone(&settled);
    let on_err = Rc::clone(&settled);
    let mut batch = client
        .batch()
        .with_concurrency(3)
        .on_response(move |_, _| on_ok.set(on_ok.get() + 1))
        .on_error(move |_, _| on_err.set(on_err.get() + 1));
    for _ in 0..10 {
        batch.get(server.url("/steady"));
    }

    let results = batch.run().expect("batch should run");
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(
        peak.get(),
        3,
        "in-flight high-water mark should equal the cap"
    );
    mock.assert_hits(10);
}

#[test]
fn stress_sequential_requests() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/ping");
        then.status(200).body("pong");
    });

    let client = Client::new();
    for i in 0..40 {
        let response = client
            .get(server.url("/ping"))
            .unwrap_or_else(|e| panic!("request {i} failed: {e}"));
        assert_eq!(response.status(), 200, "request {i} had a non-200 status");
        assert_eq!(response.body().text(), "pong");
    }
    mock.assert_hits(40);
}
