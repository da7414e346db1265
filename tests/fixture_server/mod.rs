//! A tiny single-threaded HTTP fixture server for exercising the scheduler
//! end to end, in the same shape as `tests/openai_stub` in the crate this
//! crawler was adapted from: a background thread wrapping `tiny_http`,
//! shut down over a channel when the guard drops.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub struct Route {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub location: Option<&'static str>,
}

impl Route {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.as_bytes().to_vec(),
            location: None,
        }
    }

    pub fn css(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/css",
            body: body.as_bytes().to_vec(),
            location: None,
        }
    }

    pub fn png(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: "image/png",
            body: body.to_vec(),
            location: None,
        }
    }

    pub fn redirect(location: &'static str) -> Self {
        Self {
            status: 301,
            content_type: "text/plain",
            body: Vec::new(),
            location: Some(location),
        }
    }
}

pub struct FixtureServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FixtureServer {
    pub fn spawn(routes: HashMap<&'static str, Route>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start fixture server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(_) => break,
            };

            let path = request.url().to_string();
            match routes.get(path.as_str()) {
                Some(route) => {
                    let mut response =
                        tiny_http::Response::from_data(route.body.clone())
                            .with_status_code(route.status);
                    response.add_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            route.content_type.as_bytes(),
                        )
                        .expect("content-type header"),
                    );
                    if let Some(location) = route.location {
                        response.add_header(
                            tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                                .expect("location header"),
                        );
                    }
                    let _ = request.respond(response);
                }
                None => {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                }
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
