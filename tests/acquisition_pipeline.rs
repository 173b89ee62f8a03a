//! End-to-end acquisition through the mock instrument.

use parachute_daq::acquisition::{AcquisitionController, AcquisitionState, ChannelInput, OperatorCommand};
use parachute_daq::bridge::{simulated, VoltageRatioInput, WeightSource};
use parachute_daq::config::Settings;
use parachute_daq::data::{AnemometerCsvWriter, CsvRecordWriter, FusedRecord, MemorySink, RecordSink};
use parachute_daq::instrument::mock::{MockPortHandle, MockSerialPort, SimulatedScanStream};
use parachute_daq::instrument::InstrumentSession;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.instrument.command_settle_ms = 0;
    settings.instrument.handshake_timeout_ms = 50;
    settings.application.poll_interval_ms = 1;
    settings
}

/// One cycle of a three-position scan list: speed, direction, an unused digital input.
fn cycle(speed_counts: i16, direction_counts: i16) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&speed_counts.to_le_bytes());
    bytes.extend_from_slice(&direction_counts.to_le_bytes());
    bytes.extend_from_slice(&0x7fffi16.to_le_bytes());
    bytes
}

async fn configured_session(settings: &Settings) -> (InstrumentSession<MockSerialPort>, MockPortHandle) {
    let (port, handle) = MockSerialPort::new("mock0");
    let mut session = InstrumentSession::new(port, settings.instrument.clone());
    session.configure().await.unwrap();
    (session, handle)
}

#[tokio::test]
async fn test_go_stop_go_quit_sequence() {
    let mut settings = fast_settings();
    settings.instrument.scan_list = vec![0x0000, 0x0001, 0x0008];
    let (session, handle) = configured_session(&settings).await;
    assert_eq!(
        handle.commands(),
        [
            "stop",
            "encode 0",
            "ps 0",
            "slist 0 0",
            "slist 1 1",
            "slist 2 8",
            "dec 512",
            "srate 11718"
        ]
    );

    let weights = WeightSource::new(&settings.bridge.channels, 16, true);
    let sink = MemorySink::new();
    let mut controller = AcquisitionController::new(session, weights, sink.clone(), &settings).unwrap();
    let updater = controller.weights().updater();

    let t0 = Instant::now();
    controller.handle_command(OperatorCommand::Go, t0).await.unwrap();
    assert_eq!(handle.commands().last().map(String::as_str), Some("start"));

    // 10 cycles over one second, weights changing halfway
    for step in 1..=10u64 {
        if step == 6 {
            updater.on_voltage_ratio_change(0, 0.0).unwrap();
            updater.on_voltage_ratio_change(1, 0.0).unwrap();
        }
        handle.push_bytes(&cycle(-16384, 0));
        controller
            .poll_instrument(t0 + Duration::from_millis(step * 100))
            .await
            .unwrap();
    }

    controller
        .handle_command(OperatorCommand::Stop, t0 + Duration::from_millis(1050))
        .await
        .unwrap();
    assert_eq!(controller.state(), AcquisitionState::Idle);

    // input while idle is not decoded and is discarded on the next go
    handle.push_bytes(&cycle(16384, 16384));
    assert_eq!(controller.poll_instrument(t0 + Duration::from_secs(2)).await.unwrap(), 0);
    handle.push_bytes(b"stop\r");

    let t1 = t0 + Duration::from_secs(30);
    controller.handle_command(OperatorCommand::Go, t1).await.unwrap();
    handle.push_bytes(&cycle(16384, 16384));
    controller
        .poll_instrument(t1 + Duration::from_millis(700))
        .await
        .unwrap();

    let mut quit: VecDeque<OperatorCommand> = [OperatorCommand::Quit].into();
    let summary = controller.run(&mut quit).await.unwrap();

    let records = sink.records();
    assert_eq!(records[0], FusedRecord::zero());
    let times: Vec<f64> = records.iter().map(|r| r.elapsed_seconds).collect();
    assert_eq!(times, [0.0, 0.5, 1.0, 0.7]);

    // -5 V on the speed channel clamps to zero, 0 V on the vane wraps below the offset
    assert_eq!(records[1].wind_speed, 0.0);
    let expected_direction = (-1.32 / 5.28 * 360.0 + 8.2f64).rem_euclid(360.0);
    assert!((records[1].wind_direction - expected_direction).abs() < 1e-9);
    assert_eq!(records[1].z_avg_weight, 0.0, "weights not yet updated at 0.5 s");
    assert!(records[2].z_avg_weight > 0.0);
    assert!((records[3].wind_speed - 27.878787878787879).abs() < 1e-9);

    assert_eq!(summary.records, 4);
    assert_eq!(summary.cycles, 11);
    assert_eq!(summary.sessions, 2);
    assert_eq!(controller.state(), AcquisitionState::Terminated);
    assert!(sink.is_closed());
    assert!(!handle.is_streaming());
}

#[tokio::test]
async fn test_csv_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings();
    settings.storage.output_dir = dir.path().to_path_buf();
    let (session, handle) = configured_session(&settings).await;

    let sinks: Vec<Box<dyn RecordSink>> = vec![
        Box::new(CsvRecordWriter::create(settings.storage.combined_path()).unwrap()),
        Box::new(AnemometerCsvWriter::create(settings.storage.anemometer_path()).unwrap()),
    ];
    let weights = WeightSource::new(&settings.bridge.channels, 16, true);
    let mut controller = AcquisitionController::new(session, weights, sinks, &settings).unwrap();

    let t0 = Instant::now();
    controller.emit_origin().await.unwrap();
    controller.handle_command(OperatorCommand::Go, t0).await.unwrap();
    handle.push_bytes(&[0x00, 0x40, 0x00, 0x40]);
    controller
        .poll_instrument(t0 + Duration::from_millis(500))
        .await
        .unwrap();
    let mut quit: VecDeque<OperatorCommand> = [OperatorCommand::Quit].into();
    controller.run(&mut quit).await.unwrap();

    let combined = std::fs::read_to_string(settings.storage.combined_path()).unwrap();
    let lines: Vec<&str> = combined.lines().collect();
    assert_eq!(
        lines,
        [
            "elapsed_seconds,wind_speed_m_s,wind_direction_deg,weight_z_N,weight_x_N,weight_y_N",
            "0,0,0,0,0,0",
            "0.5,27.87879,259.10909,0,0,0",
        ]
    );

    let anemometer = std::fs::read_to_string(settings.storage.anemometer_path()).unwrap();
    let lines: Vec<&str> = anemometer.lines().collect();
    assert_eq!(
        lines,
        [
            "days,seconds,wind_speed_m_s,wind_direction_deg",
            "0,0,0,0",
            "0,0.5,27.87879,259.10909",
        ]
    );
}

#[tokio::test]
async fn test_simulated_rig_end_to_end() {
    let mut settings = fast_settings();
    settings.bridge.tare_samples = 4;

    let channels = simulated::default_channels(Duration::from_millis(2));
    let weights = WeightSource::new(&settings.bridge.channels, settings.bridge.tare_samples, false);
    let inputs: Vec<Arc<dyn VoltageRatioInput>> = channels
        .iter()
        .map(|channel| Arc::clone(channel) as Arc<dyn VoltageRatioInput>)
        .collect();
    weights.tare_all(&inputs).await.unwrap();
    let bridge = simulated::spawn_callbacks(channels, weights.updater());

    let stream = SimulatedScanStream::new(&settings.instrument.scan_list(), 10.0, settings.wind.clone(), 200.0);
    let (port, handle) = MockSerialPort::simulated("simulated", stream);
    let mut session = InstrumentSession::new(port, settings.instrument.clone());
    session.configure().await.unwrap();

    let sink = MemorySink::new();
    let mut controller = AcquisitionController::new(session, weights, sink.clone(), &settings).unwrap();

    let (sender, mut input) = ChannelInput::new();
    sender.send(OperatorCommand::Go).unwrap();
    let quitter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        sender.send(OperatorCommand::Quit).unwrap();
    });

    let summary = controller.run(&mut input).await.unwrap();
    quitter.await.unwrap();
    bridge.abort();

    let records = sink.records();
    assert!(records.len() >= 2, "got {} records", records.len());
    assert_eq!(records[0], FusedRecord::zero());
    for record in &records[1..] {
        assert!((0.0..=40.0).contains(&record.wind_speed));
        assert!((0.0..360.0).contains(&record.wind_direction));
        // tared on the same noisy ratios, so loads stay near zero
        assert!(record.z_avg_weight.abs() < 1.0);
    }
    assert!(summary.cycles > 0);
    assert!(!handle.is_streaming());
}
