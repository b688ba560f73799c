use tokio::time::Duration;

use request_log_sink::request::{flush_to_tracing, set_request_id};
use request_log_sink::{request_error, request_info, Logger, LoggerConfig, RemoteConfig, RequestContext};

async fn handle(order_id: u64) {
    let ctx = RequestContext::current();
    request_info!(ctx.as_ref(), "loading order {}", order_id);
    if order_id % 2 == 1 {
        request_error!(ctx.as_ref(), "order {} has no payment", order_id);
    }
}

#[tokio::main]
async fn main() {
    request_log_sink::config::load(".");

    let mut config = LoggerConfig::from_env();
    if config.remote.is_none() {
        config.remote = Some(RemoteConfig {
            enabled: true,
            url: "http://127.0.0.1:3100/loki/api/v1/push".to_string(),
            batch_wait: Duration::from_millis(500),
            ..Default::default()
        });
    }

    let logger = Logger::new(config).expect("build logger");
    logger.install().expect("install logger");

    for order_id in 1..=3 {
        let ctx = RequestContext::new().bind();
        set_request_id(Some(&ctx), format!("req-{}", order_id));
        ctx.clone().scope(handle(order_id)).await;
        flush_to_tracing(&ctx);
    }

    logger.close().await;
}
