//! Scripted [`RequestExecutor`] for driving the facade deterministically.
//!
//! Requests without a standing route are held until the test answers them
//! with [`ScriptedExecutor::respond`] or [`ScriptedExecutor::fail`], so the
//! order in which bootstrap responses arrive is fully under test control.
//! Completions always run outside the executor's lock, so they may issue
//! further requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use syncmate_core::rest::{ApiRequest, Completion, Method, RequestError, RequestExecutor};

#[derive(Default)]
struct Script {
    log: Vec<ApiRequest>,
    held: Vec<(ApiRequest, Completion)>,
    routes: HashMap<(Method, String), Result<String, RequestError>>,
}

#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<Script>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock poisoned")
    }

    /// Answer every future `method path` request immediately with `result`.
    pub fn route(&self, method: Method, path: &str, result: Result<&str, RequestError>) {
        self.lock().routes.insert(
            (method, path.to_string()),
            result.map(str::to_string),
        );
    }

    /// Complete the oldest held request for `path` with `body`.
    ///
    /// Returns `false` if no such request is held.
    pub fn respond(&self, path: &str, body: &str) -> bool {
        self.complete(path, Ok(body.to_string()))
    }

    /// Complete the oldest held request for `path` with `error`.
    pub fn fail(&self, path: &str, error: RequestError) -> bool {
        self.complete(path, Err(error))
    }

    fn complete(&self, path: &str, result: Result<String, RequestError>) -> bool {
        let completion = {
            let mut script = self.lock();
            let Some(index) = script.held.iter().position(|(req, _)| req.path == path) else {
                return false;
            };
            script.held.remove(index).1
        };
        completion(result);
        true
    }

    /// Paths of the requests still waiting for an answer, oldest first.
    pub fn held_paths(&self) -> Vec<String> {
        self.lock()
            .held
            .iter()
            .map(|(req, _)| req.path.clone())
            .collect()
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().log.clone()
    }

    /// Bodies of every POST to `path`, in order.
    pub fn posted_bodies(&self, path: &str) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|req| req.method == Method::Post && req.path == path)
            .filter_map(|req| req.body.clone())
            .collect()
    }
}

impl RequestExecutor for ScriptedExecutor {
    fn execute(&self, request: ApiRequest, on_complete: Completion) {
        let result = {
            let mut script = self.lock();
            script.log.push(request.clone());
            let key = (request.method, request.path.clone());
            match script.routes.get(&key) {
                Some(result) => result.clone(),
                None => {
                    script.held.push((request, on_complete));
                    return;
                }
            }
        };
        on_complete(result);
    }
}
