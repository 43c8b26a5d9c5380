use ferrous_forward_application::ports::DnsHandler;
use ferrous_forward_domain::{CliOverrides, Config};
use ferrous_forward_infrastructure::dns::{
    build_forwarder, ForwardMetrics, Forwarder, QueryTapEmitter, RefuseHandler,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

pub fn load_config(path: Option<&str>, overrides: CliOverrides) -> anyhow::Result<Config> {
    let config = Config::load(path, overrides)?;
    config.validate()?;
    Ok(config)
}

pub fn init_logging(config: &Config) {
    let level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// The handler chain plus the forwarders in it, for lifecycle calls.
pub struct Chain {
    pub head: Arc<dyn DnsHandler>,
    pub forwarders: Vec<Arc<Forwarder>>,
}

/// Link the `[[forward]]` rules in file order, ending in a handler that refuses.
pub async fn build_chain(config: &Config) -> anyhow::Result<Chain> {
    let metrics = ForwardMetrics::new();
    let tap = QueryTapEmitter::new_disabled();

    let mut head: Arc<dyn DnsHandler> = Arc::new(RefuseHandler);
    let mut forwarders = Vec::with_capacity(config.forward.len());

    for rule in config.forward.iter().rev() {
        let forwarder = Arc::new(
            build_forwarder(rule, metrics.clone(), tap.clone(), Some(Arc::clone(&head))).await?,
        );
        head = Arc::clone(&forwarder) as Arc<dyn DnsHandler>;
        forwarders.push(forwarder);
    }
    forwarders.reverse();

    info!(rules = forwarders.len(), "Forward chain ready");
    Ok(Chain { head, forwarders })
}
