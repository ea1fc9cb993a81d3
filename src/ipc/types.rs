use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::controller::GradesController;
use crate::presenter::EventBuffer;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub type Session = GradesController<EventBuffer>;

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: EngineConfig,
    pub runtime: tokio::runtime::Runtime,
    pub sessions: HashMap<String, Session>,
}

impl AppState {
    pub fn new(config: EngineConfig, runtime: tokio::runtime::Runtime) -> Self {
        Self {
            workspace: None,
            db: None,
            config,
            runtime,
            sessions: HashMap::new(),
        }
    }

    /// Cancel and drop every open grading session.
    pub fn close_sessions(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
    }
}
