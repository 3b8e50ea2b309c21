//! Boundary to the external analytic engine.
//!
//! A package saved without an embedded schema only carries the binary
//! `DataModel`. Turning it into a schema needs a local engine process that
//! loads the model and a client that asks the engine to serialize it. Both
//! live outside this crate and are reached through the [`AnalyticEngine`]
//! and [`SchemaClient`] traits.
//!
//! A session acquires three resources in order (the running engine, the
//! loaded database and the client connection) and releases them in reverse
//! order on every exit path through drop guards.

use crate::common::{Error, Result};
use serde_json::Value;

/// Options for [`SchemaClient::serialize_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Leave out modification and refresh timestamps
    pub omit_timestamps: bool,
    /// Leave out objects the engine inferred rather than stored
    pub omit_inferred_objects: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            omit_timestamps: true,
            omit_inferred_objects: true,
        }
    }
}

/// A local analytic engine process.
pub trait AnalyticEngine {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Load a binary model under `name`.
    fn load_database(&mut self, name: &str, model: &[u8]) -> Result<()>;

    fn unload_database(&mut self, name: &str) -> Result<()>;

    /// Connection string a [`SchemaClient`] can use to reach the engine.
    fn connect_string(&self) -> Result<String>;
}

/// A client able to serialize a loaded database to schema JSON.
pub trait SchemaClient {
    fn connect(&mut self, connect_string: &str) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    /// Return the schema of database `name` as JSON text.
    fn serialize_database(&mut self, name: &str, options: &SerializeOptions) -> Result<String>;
}

/// Name the binary model is loaded under.
pub const DATABASE_NAME: &str = "Model";

fn unavailable(step: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |err| match err {
        Error::EngineUnavailable(message) => {
            Error::EngineUnavailable(format!("{}: {}", step, message))
        },
        other => Error::EngineUnavailable(format!("{}: {}", step, other)),
    }
}

/// Started engine, stopped on drop.
pub struct RunningEngine<'e, E: AnalyticEngine + ?Sized> {
    engine: &'e mut E,
}

impl<'e, E: AnalyticEngine + ?Sized> RunningEngine<'e, E> {
    pub fn start(engine: &'e mut E) -> Result<Self> {
        engine.start().map_err(unavailable("start engine"))?;
        tracing::debug!("analytic engine started");
        Ok(Self { engine })
    }
}

impl<E: AnalyticEngine + ?Sized> Drop for RunningEngine<'_, E> {
    fn drop(&mut self) {
        if let Err(err) = self.engine.stop() {
            tracing::warn!(error = %err, "failed to stop analytic engine");
        }
    }
}

/// Database loaded into a running engine, unloaded on drop.
pub struct LoadedDatabase<'a, 'e, E: AnalyticEngine + ?Sized> {
    running: &'a mut RunningEngine<'e, E>,
    name: String,
}

impl<'a, 'e, E: AnalyticEngine + ?Sized> LoadedDatabase<'a, 'e, E> {
    pub fn load(running: &'a mut RunningEngine<'e, E>, name: &str, model: &[u8]) -> Result<Self> {
        running
            .engine
            .load_database(name, model)
            .map_err(unavailable("load model"))?;
        tracing::debug!(database = name, bytes = model.len(), "model loaded");
        Ok(Self {
            running,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connect_string(&self) -> Result<String> {
        self.running
            .engine
            .connect_string()
            .map_err(unavailable("resolve connect string"))
    }
}

impl<E: AnalyticEngine + ?Sized> Drop for LoadedDatabase<'_, '_, E> {
    fn drop(&mut self) {
        if let Err(err) = self.running.engine.unload_database(&self.name) {
            tracing::warn!(database = %self.name, error = %err, "failed to unload model");
        }
    }
}

/// Connected client, disconnected on drop.
pub struct ClientConnection<'c, C: SchemaClient + ?Sized> {
    client: &'c mut C,
}

impl<'c, C: SchemaClient + ?Sized> ClientConnection<'c, C> {
    pub fn connect(client: &'c mut C, connect_string: &str) -> Result<Self> {
        client
            .connect(connect_string)
            .map_err(unavailable("connect schema client"))?;
        Ok(Self { client })
    }

    pub fn serialize_database(&mut self, name: &str, options: &SerializeOptions) -> Result<String> {
        self.client
            .serialize_database(name, options)
            .map_err(unavailable("serialize database"))
    }
}

impl<C: SchemaClient + ?Sized> Drop for ClientConnection<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.client.disconnect() {
            tracing::warn!(error = %err, "failed to disconnect schema client");
        }
    }
}

/// Run one engine session that turns a binary model into schema JSON.
///
/// Invalid JSON coming back from the client is a decode error
/// ([`Error::CorruptContainer`]); everything else that goes wrong is
/// [`Error::EngineUnavailable`].
pub fn materialize_schema<E, C>(engine: &mut E, client: &mut C, model: &[u8]) -> Result<Value>
where
    E: AnalyticEngine + ?Sized,
    C: SchemaClient + ?Sized,
{
    let mut running = RunningEngine::start(engine)?;
    let loaded = LoadedDatabase::load(&mut running, DATABASE_NAME, model)?;
    let connect_string = loaded.connect_string()?;
    let mut connection = ClientConnection::connect(client, &connect_string)?;

    let text = connection.serialize_database(loaded.name(), &SerializeOptions::default())?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) type Log = Rc<RefCell<Vec<String>>>;

    pub(crate) struct FakeEngine {
        log: Log,
        fail_load: bool,
    }

    impl AnalyticEngine for FakeEngine {
        fn start(&mut self) -> Result<()> {
            self.log.borrow_mut().push("start".into());
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.log.borrow_mut().push("stop".into());
            Ok(())
        }

        fn load_database(&mut self, name: &str, _model: &[u8]) -> Result<()> {
            self.log.borrow_mut().push(format!("load {}", name));
            if self.fail_load {
                return Err(Error::Io(std::io::Error::other("model is locked")));
            }
            Ok(())
        }

        fn unload_database(&mut self, name: &str) -> Result<()> {
            self.log.borrow_mut().push(format!("unload {}", name));
            Ok(())
        }

        fn connect_string(&self) -> Result<String> {
            Ok("Data Source=localhost:54321".into())
        }
    }

    pub(crate) struct FakeClient {
        log: Log,
        response: std::result::Result<String, String>,
    }

    impl SchemaClient for FakeClient {
        fn connect(&mut self, connect_string: &str) -> Result<()> {
            self.log.borrow_mut().push(format!("connect {}", connect_string));
            Ok(())
        }

        fn disconnect(&mut self) -> Result<()> {
            self.log.borrow_mut().push("disconnect".into());
            Ok(())
        }

        fn serialize_database(&mut self, name: &str, options: &SerializeOptions) -> Result<String> {
            assert!(options.omit_timestamps && options.omit_inferred_objects);
            self.log.borrow_mut().push(format!("serialize {}", name));
            self.response
                .clone()
                .map_err(Error::EngineUnavailable)
        }
    }

    pub(crate) fn fakes(fail_load: bool, response: std::result::Result<String, String>) -> (Log, FakeEngine, FakeClient) {
        let log: Log = Rc::default();
        let engine = FakeEngine {
            log: Rc::clone(&log),
            fail_load,
        };
        let client = FakeClient {
            log: Rc::clone(&log),
            response,
        };
        (log, engine, client)
    }

    #[test]
    fn test_session_releases_in_reverse_order() {
        let (log, mut engine, mut client) = fakes(false, Ok(r#"{"name":"Model"}"#.into()));
        let schema = materialize_schema(&mut engine, &mut client, b"model").unwrap();
        assert_eq!(schema["name"], "Model");
        assert_eq!(
            *log.borrow(),
            vec![
                "start",
                "load Model",
                "connect Data Source=localhost:54321",
                "serialize Model",
                "disconnect",
                "unload Model",
                "stop",
            ]
        );
    }

    #[test]
    fn test_load_failure_still_stops_engine() {
        let (log, mut engine, mut client) = fakes(true, Ok("{}".into()));
        let err = materialize_schema(&mut engine, &mut client, b"model").unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable(ref m) if m.contains("model is locked")));
        assert_eq!(*log.borrow(), vec!["start", "load Model", "stop"]);
    }

    #[test]
    fn test_serialize_failure_releases_everything() {
        let (log, mut engine, mut client) = fakes(false, Err("timeout".into()));
        let err = materialize_schema(&mut engine, &mut client, b"model").unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable(_)));
        assert_eq!(log.borrow().last().map(String::as_str), Some("stop"));
        assert!(log.borrow().contains(&"disconnect".to_string()));
        assert!(log.borrow().contains(&"unload Model".to_string()));
    }
}
