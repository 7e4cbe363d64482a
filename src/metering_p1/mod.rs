use crate::sink::{self, ReadingSink};
use log::{debug, info};
use tokio::io::AsyncRead;
use tokio::sync::watch;

pub mod line_reader;
pub mod meter_definitions;
pub mod parser;
pub mod structs;
pub mod utils;

use line_reader::{LineReader, SerialError};
use parser::TelegramParser;
use structs::{ParserOptions, Snapshot};

/// Reads one P1 port, parses its telegrams and hands every completed one to
/// the sink.
pub struct P1Manager<R, S> {
    name: String,
    reader: LineReader<R>,
    parser: TelegramParser,
    sink: S,
    telegrams: u64,
}

impl<R, S> P1Manager<R, S>
where
    R: AsyncRead + Unpin,
    S: ReadingSink,
{
    pub fn new(name: &str, reader: LineReader<R>, options: ParserOptions, sink: S) -> Self {
        Self {
            name: name.to_string(),
            reader,
            parser: TelegramParser::new(options),
            sink,
            telegrams: 0,
        }
    }

    pub fn parser(&self) -> &TelegramParser {
        &self.parser
    }

    /// Completed telegrams since start.
    pub fn telegrams(&self) -> u64 {
        self.telegrams
    }

    /// Runs until `shutdown` flips to true or the line stream ends. A telegram
    /// still in progress at that point is dropped.
    pub async fn start_thread(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SerialError> {
        info!("Starting P1 thread for {}", self.name);
        let codes: Vec<&str> = meter_definitions::registry().iter().map(|e| e.code).collect();
        debug!("{} decodes {:?}", self.name, codes);

        loop {
            let stop = *shutdown.borrow();
            if stop {
                info!("P1 thread {} stopping after {} telegrams", self.name, self.telegrams);
                return Ok(());
            }

            let line = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender gone, stopping P1 thread {}", self.name);
                        return Ok(());
                    }
                    continue;
                }
                line = self.reader.next_line() => line?,
            };
            self.process_line(&line).await;
        }
    }

    /// Feeds a single line, delivering the snapshot if it completed a telegram.
    pub async fn process_line(&mut self, line: &str) -> Option<Snapshot> {
        let snapshot = self.parser.ingest_line(line)?;
        self.telegrams += 1;
        debug!("Send Data for {}: {:?}", self.name, snapshot.readings);
        sink::deliver(&self.sink, &snapshot).await;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Measurement, SinkError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingSink {
        inserted: Arc<Mutex<Vec<Measurement>>>,
    }

    #[async_trait]
    impl ReadingSink for RecordingSink {
        async fn insert(&self, measurement: &Measurement) -> Result<(), SinkError> {
            self.inserted.lock().unwrap().push(measurement.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stops_on_closed_stream_after_delivering() {
        let data: &[u8] = b"/XMX5\r\n1-0:1.8.2(14730.900*kWh)\r\n!1234\r\n1-0:1.8.2(1.000*kWh)\r\n";
        let sink = RecordingSink::default();
        let mut manager = P1Manager::new(
            "p1",
            LineReader::new(data, Duration::from_secs(1)),
            ParserOptions::default(),
            sink.clone(),
        );
        let (_tx, rx) = watch::channel(false);

        let result = manager.start_thread(rx).await;
        assert!(matches!(result, Err(SerialError::Closed)));
        assert_eq!(manager.telegrams(), 1);

        let inserted = sink.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].fields["delivered_high"], 14730.9);
        // the unterminated telegram was never flushed
        assert_eq!(manager.parser().readings().delivered_tariff2, 1.0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_read() {
        let mock = tokio_test::io::Builder::new()
            .read(b"/XMX5\r\n1-0:1.8.1(12972.117*kWh)\r\n")
            .wait(Duration::from_secs(3600))
            .build();
        let sink = RecordingSink::default();
        let mut manager = P1Manager::new(
            "p1",
            LineReader::new(mock, Duration::from_secs(3600)),
            ParserOptions::default(),
            sink.clone(),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let result = manager.start_thread(rx).await;
            (result.is_ok(), manager.telegrams())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let (ok, telegrams) = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(ok);
        assert_eq!(telegrams, 0);
        assert!(sink.inserted.lock().unwrap().is_empty());
    }
}
