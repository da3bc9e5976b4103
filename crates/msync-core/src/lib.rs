pub mod bootstrap;
pub mod engine;
pub mod model;
pub mod notify;
pub mod poller;
pub mod prefs;
pub mod registry;
pub mod service;
pub mod session;
