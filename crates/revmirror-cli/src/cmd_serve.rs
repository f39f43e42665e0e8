use std::sync::Arc;

use revmirror_serve::{GateConfig, ProcessHandoff, ServeConfig};
use revmirror_store::{Config, StatePaths};

pub fn execute(paths: &StatePaths, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load(paths)?;
    let gate = GateConfig::from(&config);
    if gate.project_root.is_none() || gate.secret.is_none() {
        tracing::warn!("project_root or secret not set; every webhook will be refused");
    }
    if gate.allow_insecure {
        tracing::warn!("allow_insecure is set; webhooks are accepted without TLS");
    }
    paths.ensure_layout()?;

    let serve = ServeConfig {
        bind: bind.unwrap_or(config.bind),
        port: port.unwrap_or(config.port),
    };
    let handoff = Arc::new(ProcessHandoff::current(&paths.root)?);
    tokio::runtime::Runtime::new()?.block_on(revmirror_serve::serve(serve, gate, handoff))
}
