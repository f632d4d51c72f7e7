//! In-memory transport for cache tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::{json, Value};

use super::error::TransportError;
use super::traits::Transport;

type Handler = Box<dyn Fn(usize, &str) -> Result<Value, TransportError> + Send + Sync>;

/// Records every request and answers it through a handler.
///
/// The handler gets the zero-based call number and the URL. Like a real
/// HTTP request, a response is only "sent" once its future is first polled;
/// [`sent`](Self::sent) counts those.
pub(crate) struct MockTransport {
  calls: AtomicUsize,
  sent: Arc<AtomicUsize>,
  requests: Mutex<Vec<String>>,
  handler: Handler,
}

impl MockTransport {
  pub fn new<F>(handler: F) -> Arc<Self>
  where
    F: Fn(usize, &str) -> Result<Value, TransportError> + Send + Sync + 'static,
  {
    Arc::new(Self {
      calls: AtomicUsize::new(0),
      sent: Arc::new(AtomicUsize::new(0)),
      requests: Mutex::new(Vec::new()),
      handler: Box::new(handler),
    })
  }

  /// Serve `$skip`/`$top` slices of `data`.
  pub fn collection(data: &[&str]) -> Arc<Self> {
    let data: Vec<String> = data.iter().map(|s| s.to_string()).collect();
    Self::new(move |_, url| Ok(page_of(&data, url)))
  }

  /// URLs of all requests issued so far, in order.
  pub fn requests(&self) -> Vec<String> {
    self.requests.lock().unwrap().clone()
  }

  /// Number of request futures polled so far.
  pub fn sent(&self) -> usize {
    self.sent.load(Ordering::SeqCst)
  }
}

impl Transport for MockTransport {
  fn request(&self, method: Method, url: &str) -> BoxFuture<'static, Result<Value, TransportError>> {
    assert_eq!(method, Method::GET);
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(url.to_string());
    let response = (self.handler)(call, url);
    let sent = Arc::clone(&self.sent);
    async move {
      sent.fetch_add(1, Ordering::SeqCst);
      response
    }
    .boxed()
  }
}

/// The 26 test records "a" to "z".
pub(crate) fn letters() -> Vec<&'static str> {
  vec![
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s",
    "t", "u", "v", "w", "x", "y", "z",
  ]
}

/// The expected page for reading `index..index + length` of the letters.
pub(crate) fn letters_page(index: usize, length: usize) -> Value {
  let data: Vec<String> = letters().iter().map(|s| s.to_string()).collect();
  slice_page(&data, index, length)
}

/// A response for the `$skip`/`$top` range named in `url`.
pub(crate) fn page_of(data: &[String], url: &str) -> Value {
  slice_page(data, param(url, "$skip"), param(url, "$top"))
}

pub(crate) fn server_error(url: &str) -> TransportError {
  TransportError::Status {
    url: url.to_string(),
    status: 500,
    body: "Internal Server Error".to_string(),
  }
}

fn slice_page(data: &[String], skip: usize, top: usize) -> Value {
  let value: Vec<&String> = data.iter().skip(skip).take(top).collect();
  json!({ "@odata.context": "$metadata#TEAMS", "value": value })
}

fn param(url: &str, name: &str) -> usize {
  let prefix = format!("{}=", name);
  url
    .split(['?', '&'])
    .find_map(|part| part.strip_prefix(prefix.as_str()))
    .and_then(|value| value.parse().ok())
    .unwrap_or_else(|| panic!("{} missing in {}", name, url))
}
