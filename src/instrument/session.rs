//! Instrument session: configuration handshake, start/stop and raw readout.

use super::SerialTransport;
use crate::config::InstrumentConfig;
use crate::error::{AppResult, DaqError};
use crate::protocol::{
    configure_scan_list, decode_line, encode, InstrumentCommand, RangeTable, RangeTables,
    ScanList, ScanListConfiguration, ScanSlot,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Poll spacing while waiting for a command echo.
const ECHO_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Owns the serial link and the scan-list configuration of one instrument.
pub struct InstrumentSession<T: SerialTransport> {
    transport: T,
    config: InstrumentConfig,
    acquiring: bool,
    scan: Option<ScanListConfiguration>,
}

impl<T: SerialTransport> InstrumentSession<T> {
    /// Wraps an opened transport.
    pub fn new(transport: T, config: InstrumentConfig) -> Self {
        Self {
            transport,
            config,
            acquiring: false,
            scan: None,
        }
    }

    /// Whether the instrument is streaming.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// Configured scan list, once [`configure`](Self::configure) succeeded.
    pub fn scan_list(&self) -> Option<&ScanList> {
        self.scan.as_ref().map(|scan| &scan.scan_list)
    }

    /// Range table parallel to the scan list.
    pub fn range_table(&self) -> Option<&RangeTable> {
        self.scan.as_ref().map(|scan| &scan.range_table)
    }

    /// Sends one command.
    ///
    /// Outside acquisition the instrument echoes every command; the echo is read back
    /// and returned so the handshake can be followed in the log. `None` means no echo
    /// arrived within the handshake timeout.
    pub async fn send_command(&mut self, command: &InstrumentCommand) -> AppResult<Option<String>> {
        let text = command.to_string();
        self.transport.write_all(&encode(&text))?;
        debug!("[{}] Sent command: {}", self.transport.name(), text);

        let settle = self.config.command_settle();
        if !settle.is_zero() {
            sleep(settle).await;
        }

        if self.acquiring {
            return Ok(None);
        }
        self.read_echo(&text).await
    }

    async fn read_echo(&mut self, command: &str) -> AppResult<Option<String>> {
        let deadline = Instant::now() + self.config.handshake_timeout();
        let mut line = Vec::new();

        loop {
            let chunk = self.transport.read_available()?;
            for byte in chunk {
                if matches!(byte, b'\r' | b'\n') {
                    let response = decode_line(&line);
                    line.clear();
                    if !response.trim_start_matches('\0').is_empty() {
                        info!("{}", response);
                        return Ok(Some(response));
                    }
                } else {
                    line.push(byte);
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "[{}] No echo for '{}' within {:?}",
                    self.transport.name(),
                    command,
                    self.config.handshake_timeout()
                );
                return Ok(None);
            }
            sleep(ECHO_POLL_INTERVAL).await;
        }
    }

    /// Runs the configuration handshake with the scan list from the configuration.
    pub async fn configure(&mut self) -> AppResult<&ScanListConfiguration> {
        let scan_list = self.config.scan_list();
        let slots: Vec<ScanSlot> = scan_list.slots().collect();
        let ranges = self.config.ranges();
        self.configure_with(slots, &ranges).await
    }

    /// Runs the configuration handshake: stop, encode, ps, slist per position, dec, srate.
    ///
    /// The scan list is validated before anything is sent; an ordering error leaves the
    /// instrument untouched.
    pub async fn configure_with<I>(
        &mut self,
        slots: I,
        ranges: &RangeTables,
    ) -> AppResult<&ScanListConfiguration>
    where
        I: IntoIterator<Item = ScanSlot>,
    {
        if self.acquiring {
            return Err(DaqError::Instrument(
                "cannot reconfigure while acquiring".to_string(),
            ));
        }
        let scan = configure_scan_list(slots, ranges)?;

        self.send_command(&InstrumentCommand::Stop).await?;
        self.send_command(&InstrumentCommand::Encode(self.config.encoding))
            .await?;
        self.send_command(&InstrumentCommand::PacketSize(self.config.packet_size))
            .await?;
        for command in &scan.commands {
            self.send_command(command).await?;
        }
        self.send_command(&InstrumentCommand::Decimation(self.config.decimation))
            .await?;
        self.send_command(&InstrumentCommand::SampleRate(self.config.sample_rate))
            .await?;

        info!(
            "Configured {} scan-list position(s), range table {:?}",
            scan.scan_list.len(),
            scan.range_table.as_slice()
        );
        Ok(&*self.scan.insert(scan))
    }

    /// Starts the binary stream.
    pub async fn start_acquisition(&mut self) -> AppResult<()> {
        if self.scan.is_none() {
            return Err(DaqError::Instrument(
                "start requested before configuration".to_string(),
            ));
        }
        // the binary stream follows immediately, so there is no echo to wait for
        self.acquiring = true;
        if let Err(e) = self.send_command(&InstrumentCommand::Start).await {
            self.acquiring = false;
            return Err(e);
        }
        Ok(())
    }

    /// Discards buffered input, such as a late echo that arrived after the last stop.
    pub fn clear_input(&mut self) -> AppResult<()> {
        self.transport.clear_input()
    }

    /// Stops the stream and discards whatever is still buffered.
    pub async fn stop_acquisition(&mut self) -> AppResult<()> {
        let was_acquiring = self.acquiring;
        self.acquiring = true;
        let sent = self.send_command(&InstrumentCommand::Stop).await;
        self.acquiring = false;
        sent?;
        self.transport.clear_input()?;
        if was_acquiring {
            debug!("[{}] Acquisition stopped", self.transport.name());
        }
        Ok(())
    }

    /// Returns whatever bytes are buffered; may be empty, a partial cycle or several cycles.
    pub fn read_available(&mut self) -> AppResult<Bytes> {
        Ok(Bytes::from(self.transport.read_available()?))
    }
}
