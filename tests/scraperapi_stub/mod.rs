use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Query of one request received by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubRequest {
    pub api_key: String,
    pub url: String,
    pub render: String,
}

/// Stands in for the rendering API: `GET /?api_key=..&url=..&render=true`.
pub struct ScraperApiStub {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ScraperApiStub {
    /// `handler` decides the `(status, body)` of call number `index` (0-based).
    pub fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(usize, &StubRequest) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start scraperapi stub server");
        let addr = server.server_addr();
        let endpoint = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let Some(parsed) = parse_query(request.url()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing api_key or url")
                            .with_status_code(400),
                    );
                    continue;
                };

                let index = {
                    let mut requests = recorded.lock().expect("lock stub requests");
                    requests.push(parsed.clone());
                    requests.len() - 1
                };
                let (status, body) = handler(index, &parsed);
                let _ = request
                    .respond(tiny_http::Response::from_string(body).with_status_code(status));
            }
        });

        Self {
            endpoint,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().expect("lock stub requests").clone()
    }
}

impl Drop for ScraperApiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn parse_query(path: &str) -> Option<StubRequest> {
    let url = url::Url::parse(&format!("http://stub{path}")).ok()?;
    let mut api_key = None;
    let mut target = None;
    let mut render = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "api_key" => api_key = Some(value.into_owned()),
            "url" => target = Some(value.into_owned()),
            "render" => render = value.into_owned(),
            _ => {}
        }
    }
    Some(StubRequest {
        api_key: api_key?,
        url: target?,
        render,
    })
}

/// An Indeed review page with `count` well-formed review cards.
pub fn indeed_page(company: &str, count: usize) -> String {
    let cards = (1..=count)
        .map(|i| {
            format!(
                r#"<div data-testid="review-card">
  <h2 data-testid="review-title">{company} review {i}</h2>
  <div itemprop="ratingValue" content="4.0"></div>
  <span data-testid="review-text">Working at {company} taught me a lot, review number {i}.</span>
</div>"#
            )
        })
        .collect::<String>();
    format!("<!doctype html><html><head><title>{company} reviews</title></head><body>{cards}</body></html>")
}

pub fn empty_page() -> String {
    "<!doctype html><html><head><title>Reviews</title></head><body><p>No results.</p></body></html>"
        .to_owned()
}
