use hotfire::logger::{CsvRunLogger, JsonLinesLogger, LogRecord, MemoryRunLogger, RunLogger};
use hotfire::sensors::{QuantityKind, Unit};
use std::time::Duration;

fn record(millis: u64, kind: QuantityKind, value: f64) -> LogRecord {
    LogRecord {
        elapsed: Duration::from_millis(millis),
        channel_id: 0,
        kind,
        value,
        unit: kind.unit(),
    }
}

#[test]
fn test_csv_header_and_rows() {
    let mut logger = CsvRunLogger::new(Vec::new());
    logger.append(&record(1500, QuantityKind::Pressure, 12.5)).unwrap();
    logger.append(&record(2000, QuantityKind::Force, -1.25)).unwrap();

    let text = String::from_utf8(logger.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "elapsed_s,channel,quantity,value,unit");
    assert_eq!(lines[1], "1.500000,0,pressure,12.5,bar");
    assert_eq!(lines[2], "2.000000,0,force,-1.25,kg");
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_csv_file_is_readable_mid_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataDAQ.csv");
    let mut logger = CsvRunLogger::create(&path).unwrap();
    logger.append(&record(250, QuantityKind::Temperature, 21.0)).unwrap();

    // No explicit flush: every append reaches the file
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with("0.250000,0,temperature,21,°C\n"));
}

#[test]
fn test_json_lines_records() {
    let mut logger = JsonLinesLogger::new(Vec::new());
    let first = record(100, QuantityKind::Pressure, 3.0);
    let second = record(200, QuantityKind::Temperature, 19.5);
    logger.append(&first).unwrap();
    logger.append(&second).unwrap();

    let text = String::from_utf8(logger.into_inner()).unwrap();
    let parsed: Vec<LogRecord> = text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(parsed, vec![first, second]);
    assert_eq!(parsed[1].unit, Unit::Celsius);
}

#[test]
fn test_memory_logger_fails_after_limit() {
    let mut logger = MemoryRunLogger::failing_after(1);
    assert!(logger.append(&record(0, QuantityKind::Pressure, 1.0)).is_ok());
    assert!(logger.append(&record(1, QuantityKind::Pressure, 1.0)).is_err());
    assert_eq!(logger.records().len(), 1);
    assert!(logger.flush().is_ok());
}

#[test]
fn test_boxed_logger_forwards() {
    let mut boxed: Box<dyn RunLogger> = Box::new(CsvRunLogger::new(Vec::new()));
    boxed.append(&record(0, QuantityKind::Force, 0.0)).unwrap();
    boxed.flush().unwrap();
}
