use hotfire::clock::{Clock, ManualClock};
use hotfire::sensors::acquisition::{AcquisitionAdapter, AcquisitionError, ScanMode};
use hotfire::sensors::{Channel, QuantityKind, SimulatedDaq, VoltageProfile};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn channels() -> Vec<Channel> {
    vec![
        Channel::new(0, QuantityKind::Pressure),
        Channel::new(5, QuantityKind::Temperature),
    ]
}

#[test]
fn test_voltage_profiles() {
    let ramp = VoltageProfile::Ramp {
        start: 0.0,
        end: 2.0,
        over: Duration::from_secs(2),
    };
    assert_eq!(ramp.value_at(Duration::ZERO), 0.0);
    assert_eq!(ramp.value_at(Duration::from_secs(1)), 1.0);
    assert_eq!(ramp.value_at(Duration::from_secs(5)), 2.0);

    let step = VoltageProfile::Step {
        before: 1.0,
        after: 3.0,
        at: Duration::from_millis(500),
    };
    assert_eq!(step.value_at(Duration::from_millis(499)), 1.0);
    assert_eq!(step.value_at(Duration::from_millis(500)), 3.0);

    let pulse = VoltageProfile::Pulse {
        base: 0.5,
        peak: 4.0,
        from: Duration::from_millis(100),
        until: Duration::from_millis(200),
    };
    assert_eq!(pulse.value_at(Duration::from_millis(150)), 4.0);
    assert_eq!(pulse.value_at(Duration::from_millis(200)), 0.5);
}

#[test]
fn test_drain_returns_all_due_scans_interleaved() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock.clone()).with_profile(0, VoltageProfile::Constant(1.5));
    daq.start(&channels(), 10.0, ScanMode::Continuous).unwrap();

    let first = daq.read(TIMEOUT).unwrap();
    assert_eq!(first.samples.len(), 2);
    assert!(first.status.running);

    clock.advance(Duration::from_millis(500));
    let second = daq.read(TIMEOUT).unwrap();
    // Scans 1 through 5, two channels each
    assert_eq!(second.samples.len(), 10);
    assert_eq!(second.samples[0].channel_id, 0);
    assert_eq!(second.samples[0].voltage, 1.5);
    assert_eq!(second.samples[1].channel_id, 5);
    assert_eq!(second.samples[1].voltage, 0.0);
    assert!(second.samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(second.samples.iter().all(|s| s.timestamp <= clock.now()));

    // Nothing new without time passing
    assert!(daq.read(TIMEOUT).unwrap().samples.is_empty());
}

#[test]
fn test_falling_behind_latches_buffer_overrun() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock.clone()).with_buffer_capacity(4);
    daq.start(&channels(), 10.0, ScanMode::Continuous).unwrap();
    daq.read(TIMEOUT).unwrap();

    clock.advance(Duration::from_secs(1));
    let read = daq.read(TIMEOUT).unwrap();
    assert!(read.status.buffer_overrun);
    assert!(!read.status.running);
    assert!(read.samples.is_empty());

    // Latched until the scan is restarted
    assert!(daq.read(TIMEOUT).unwrap().status.is_overrun());
}

#[test]
fn test_injected_hardware_overrun() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock.clone()).with_hardware_overrun_at(Duration::from_millis(800));
    daq.start(&channels(), 10.0, ScanMode::Continuous).unwrap();

    clock.advance(Duration::from_millis(500));
    assert!(!daq.read(TIMEOUT).unwrap().status.is_overrun());
    clock.advance(Duration::from_millis(500));
    assert!(daq.read(TIMEOUT).unwrap().status.hardware_overrun);
}

#[test]
fn test_finite_scan_stops_running() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock.clone());
    daq.start(&channels(), 10.0, ScanMode::Finite { samples_per_channel: 3 })
        .unwrap();

    clock.advance(Duration::from_secs(1));
    let read = daq.read(TIMEOUT).unwrap();
    assert_eq!(read.samples.len(), 6);
    assert!(!read.status.running);
    assert!(!read.status.is_overrun());
}

#[test]
fn test_lifecycle_errors() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock);

    assert!(matches!(daq.read(TIMEOUT), Err(AcquisitionError::NotRunning)));
    assert!(daq.start(&[], 10.0, ScanMode::Continuous).is_err());
    assert!(daq.start(&channels(), 0.0, ScanMode::Continuous).is_err());

    daq.start(&channels(), 10.0, ScanMode::Continuous).unwrap();
    assert!(daq.is_running());
    assert!(daq.start(&channels(), 10.0, ScanMode::Continuous).is_err());

    daq.stop().unwrap();
    assert!(!daq.is_running());
    daq.close().unwrap();
    assert!(daq.is_closed());
    assert!(matches!(
        daq.start(&channels(), 10.0, ScanMode::Continuous),
        Err(AcquisitionError::Start(_))
    ));
}

#[test]
fn test_stop_and_close_report_misuse() {
    let clock = ManualClock::new();
    let mut daq = SimulatedDaq::new(clock);

    assert!(matches!(daq.stop(), Err(AcquisitionError::Stop(_))));
    daq.start(&channels(), 10.0, ScanMode::Continuous).unwrap();
    daq.stop().unwrap();
    assert!(matches!(daq.read(TIMEOUT), Err(AcquisitionError::NotRunning)));

    daq.close().unwrap();
    assert!(matches!(daq.close(), Err(AcquisitionError::Close(_))));
}
