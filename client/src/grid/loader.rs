//! Asynchronous HTTP loader with platform-specific implementations

use std::collections::HashSet;
use std::hash::Hash;

use super::scheduler::FetchError;

/// Loading request
#[derive(Debug, Clone)]
struct LoadRequest<K> {
    key: K,
    url: String,
}

/// Completed load: raw body bytes or the reason it failed
pub type LoadResult<K> = (K, Result<Vec<u8>, FetchError>);

// Platform-specific channel types
#[cfg(not(target_arch = "wasm32"))]
type ResultReceiver<K> = std::sync::mpsc::Receiver<LoadResult<K>>;
#[cfg(not(target_arch = "wasm32"))]
type RequestSender<K> = std::sync::mpsc::Sender<LoadRequest<K>>;

#[cfg(target_arch = "wasm32")]
use std::collections::VecDeque;
#[cfg(target_arch = "wasm32")]
use std::sync::{Arc, Mutex};

#[cfg(target_arch = "wasm32")]
type ResultReceiver<K> = Arc<Mutex<VecDeque<LoadResult<K>>>>;

/// HTTP GET loader keyed by `K`; at most one request per key is in flight
pub struct HttpLoader<K> {
    result_rx: ResultReceiver<K>,
    #[cfg(not(target_arch = "wasm32"))]
    request_tx: RequestSender<K>,
    pending: HashSet<K>,
    #[cfg(target_arch = "wasm32")]
    user_agent: String,
    #[cfg(not(target_arch = "wasm32"))]
    _worker_handles: Vec<std::thread::JoinHandle<()>>,
}

impl<K> HttpLoader<K>
where
    K: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    /// Create a new loader backed by `workers` fetch threads (native) or
    /// browser fetches (wasm)
    pub fn new(user_agent: &str, workers: usize) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            use std::sync::{Arc, Mutex};

            let (request_tx, request_rx) = std::sync::mpsc::channel::<LoadRequest<K>>();
            let (result_tx, result_rx) = std::sync::mpsc::channel::<LoadResult<K>>();
            let request_rx = Arc::new(Mutex::new(request_rx));

            let _worker_handles = (0..workers.max(1))
                .map(|_| {
                    let request_rx = Arc::clone(&request_rx);
                    let result_tx = result_tx.clone();
                    let user_agent = user_agent.to_string();
                    std::thread::spawn(move || {
                        Self::worker_thread(request_rx, result_tx, user_agent);
                    })
                })
                .collect();

            Self {
                result_rx,
                request_tx,
                pending: HashSet::new(),
                _worker_handles,
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let _ = workers;
            Self {
                result_rx: Arc::new(Mutex::new(VecDeque::new())),
                pending: HashSet::new(),
                user_agent: user_agent.to_string(),
            }
        }
    }

    /// Request `url` under `key`. Returns false if the key is already loading
    /// or the loader can no longer accept work.
    pub fn request(&mut self, key: K, url: String) -> bool {
        if self.pending.contains(&key) {
            return false;
        }

        let request = LoadRequest {
            key: key.clone(),
            url,
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            if self.request_tx.send(request).is_err() {
                log::error!("HTTP loader workers are gone, dropping {:?}", key);
                return false;
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            self.spawn_wasm_fetch(request);
        }

        self.pending.insert(key);
        true
    }

    /// Poll for a completed load
    pub fn poll(&mut self) -> Option<LoadResult<K>> {
        #[cfg(not(target_arch = "wasm32"))]
        let result = self.result_rx.try_recv().ok();

        #[cfg(target_arch = "wasm32")]
        let result = match self.result_rx.lock() {
            Ok(mut results) => results.pop_front(),
            Err(_) => None,
        };

        if let Some((key, _)) = &result {
            self.pending.remove(key);
        }
        result
    }

    /// Check if a key is currently being loaded
    pub fn is_loading(&self, key: &K) -> bool {
        self.pending.contains(key)
    }

    /// Get number of pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // Native implementation
    #[cfg(not(target_arch = "wasm32"))]
    fn worker_thread(
        request_rx: std::sync::Arc<std::sync::Mutex<std::sync::mpsc::Receiver<LoadRequest<K>>>>,
        result_tx: std::sync::mpsc::Sender<LoadResult<K>>,
        user_agent: String,
    ) {
        let client = match reqwest::blocking::Client::builder()
            .user_agent(&user_agent)
            .timeout(std::time::Duration::from_secs(30))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::error!("Failed to create HTTP client: {}", e);
                return;
            }
        };

        loop {
            // Hold the lock only while waiting for the next request
            let request = match request_rx.lock() {
                Ok(rx) => match rx.recv() {
                    Ok(request) => request,
                    Err(_) => break, // Sender dropped, exit thread
                },
                Err(_) => break,
            };

            log::debug!("GET {}", request.url);
            let result = match client.get(&request.url).send() {
                Ok(response) => {
                    if response.status().is_success() {
                        response
                            .bytes()
                            .map(|bytes| bytes.to_vec())
                            .map_err(|e| FetchError::Transport(e.to_string()))
                    } else {
                        Err(FetchError::Status(response.status().as_u16()))
                    }
                }
                Err(e) => Err(FetchError::Transport(e.to_string())),
            };

            if result_tx.send((request.key, result)).is_err() {
                break; // Receiver dropped, exit thread
            }
        }
    }

    // WASM implementation using web-sys fetch API
    #[cfg(target_arch = "wasm32")]
    fn spawn_wasm_fetch(&self, request: LoadRequest<K>) {
        use wasm_bindgen::JsCast;
        use wasm_bindgen_futures::JsFuture;
        use web_sys::{Request, RequestInit, RequestMode, Response};

        let result_buffer = self.result_rx.clone();
        let user_agent = self.user_agent.clone();

        wasm_bindgen_futures::spawn_local(async move {
            let result = async {
                let opts = RequestInit::new();
                opts.set_method("GET");
                opts.set_mode(RequestMode::Cors);

                let web_request = Request::new_with_str_and_init(&request.url, &opts)
                    .map_err(|e| FetchError::Transport(format!("{:?}", e)))?;

                // Browsers may refuse to override User-Agent; that is not fatal
                let _ = web_request.headers().set("User-Agent", &user_agent);

                let window = web_sys::window()
                    .ok_or_else(|| FetchError::Transport("no window object".to_string()))?;
                let resp_value = JsFuture::from(window.fetch_with_request(&web_request))
                    .await
                    .map_err(|e| FetchError::Transport(format!("{:?}", e)))?;

                let resp: Response = resp_value
                    .dyn_into()
                    .map_err(|_| FetchError::Decode("response is not a Response".to_string()))?;

                if !resp.ok() {
                    return Err(FetchError::Status(resp.status()));
                }

                let array_buffer = JsFuture::from(
                    resp.array_buffer()
                        .map_err(|e| FetchError::Decode(format!("{:?}", e)))?,
                )
                .await
                .map_err(|e| FetchError::Transport(format!("{:?}", e)))?;

                Ok(js_sys::Uint8Array::new(&array_buffer).to_vec())
            }
            .await;

            if let Ok(mut results) = result_buffer.lock() {
                results.push_back((request.key, result));
            }
        });
    }
}
