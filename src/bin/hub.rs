use std::sync::Arc;

use clap::Parser;
use powerline_monitoring::{
    actors::{Notifiers, Pipeline, PipelineSettings},
    config::{Config, read_config_file},
    cooldown::SystemClock,
    notifiers::{DisabledChannel, EmailNotifier, HttpMailer, RealtimeHub, SmsNotifier, TwilioSms},
    storage::open_store,
    transport::{CommandPublisher, MqttListener},
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file; defaults apply when omitted
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("powerline_monitoring", LevelFilter::TRACE),
        ("powerline_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
        ("rumqttc", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => {
            warn!("no config file given, running with defaults");
            Config::default()
        }
    }
    .with_env_secrets();

    let store = open_store(config.storage.as_ref()).await?;
    let realtime = RealtimeHub::default();
    let notifiers = build_notifiers(&config, realtime.clone());

    let pipeline = Pipeline::spawn(
        Arc::clone(&store),
        notifiers,
        PipelineSettings::from(&config),
        Arc::new(SystemClock),
    );

    let listener = MqttListener::new(&config.broker, Arc::clone(&pipeline.router));
    let publisher: Arc<dyn CommandPublisher> = Arc::new(listener.publisher());

    info!(
        "connecting to MQTT broker {}:{}",
        config.broker.host, config.broker.port
    );
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    #[cfg(feature = "api")]
    {
        use powerline_monitoring::api::{ApiState, spawn_api_server};

        let state = ApiState::new(
            Arc::clone(&store),
            &pipeline,
            realtime.clone(),
            Some(Arc::clone(&publisher)),
        );
        spawn_api_server(config.api.clone(), state).await?;
    }
    #[cfg(not(feature = "api"))]
    let _ = publisher;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    let _ = shutdown_tx.send(());
    if let Err(e) = listener_task.await {
        error!("MQTT listener task failed: {e}");
    }

    pipeline.alerts.shutdown().await;

    if let Err(e) = store.close().await {
        error!("failed to close store: {e}");
    }

    debug!("hub stopped");
    Ok(())
}

fn build_notifiers(config: &Config, realtime: RealtimeHub) -> Notifiers {
    let email: Arc<dyn EmailNotifier> = match &config.email {
        Some(email) => {
            info!("email alerts via {}", email.url);
            Arc::new(HttpMailer::new(email.clone()))
        }
        None => {
            warn!("no email section configured, email alerts disabled");
            Arc::new(DisabledChannel::email())
        }
    };

    let sms: Arc<dyn SmsNotifier> = match &config.sms {
        Some(sms) if sms.auth_token.is_some() => {
            info!("SMS alerts via Twilio account {}", sms.account_sid);
            Arc::new(TwilioSms::new(sms.clone()))
        }
        Some(_) => {
            warn!("SMS configured without auth token (TWILIO_AUTH_TOKEN), SMS alerts disabled");
            Arc::new(DisabledChannel::sms())
        }
        None => {
            warn!("no sms section configured, SMS alerts disabled");
            Arc::new(DisabledChannel::sms())
        }
    };

    Notifiers {
        email,
        sms,
        realtime: Arc::new(realtime),
    }
}
