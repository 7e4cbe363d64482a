use dsmr2mqtt::metering_p1::line_reader::{open_p1_port, LineReader};
use dsmr2mqtt::mqtt::{status_topic, PublishData, Transmission};
use dsmr2mqtt::{Config, MqttManager, MqttSink, P1Manager};
use log::{error, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let default_filter = std::env::var("D2M_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = Config::load()?;

    // Open every port first, a meter we cannot reach is fatal
    let mut ports = Vec::new();
    for meter in &config.meters {
        info!("Connecting to {} on {}", meter.name, meter.serial_path);
        match open_p1_port(&meter.serial_path) {
            Ok(port) => ports.push((meter.clone(), port)),
            Err(e) => {
                error!("Unable to open {} for {}: {}", meter.serial_path, meter.name, e);
                return Err(e.into());
            }
        }
    }

    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);
    let mqtt_thread = tokio::spawn(async move {
        mqtt.start_thread().await;
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut threads: Vec<JoinHandle<()>> = Vec::new();
    for (meter, port) in ports {
        let sink = MqttSink::new(tx.clone(), &meter.name);
        let reader = LineReader::new(port, meter.read_timeout());
        let mut manager = P1Manager::new(&meter.name, reader, meter.parser_options(), sink);
        let shutdown = shutdown_rx.clone();
        threads.push(tokio::spawn(async move {
            if let Err(e) = manager.start_thread(shutdown).await {
                error!("P1 thread {} stopped: {}", meter.name, e);
            }
        }));
    }

    info!("All meters started, now waiting for a signal to exit");
    let signal = wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("Program killed by signal!");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                if threads.iter().all(|t| t.is_finished()) {
                    error!("All meter threads ended, shutting down");
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for thread in threads {
        if tokio::time::timeout(Duration::from_secs(5), thread).await.is_err() {
            warn!("P1 thread did not stop in time");
        }
    }

    let offline = PublishData {
        topic: status_topic(&config.mqtt.base_topic),
        payload: "offline".to_string(),
        retain: true,
    };
    let _ = tx.send(Transmission::Publish(offline)).await;
    drop(tx);
    // The manager exits once the queue is drained
    let _ = tokio::time::timeout(Duration::from_secs(5), mqtt_thread).await;

    Ok(())
}
