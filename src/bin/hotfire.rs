use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use hotfire::actuators::{SimulatedValves, SysfsGpioValves, ValveActuator, ValveId, ValveState};
use hotfire::clock::MonotonicClock;
use hotfire::config::{ConfigError, FiringConfig};
use hotfire::controller::{CancelToken, FiringController, RunReport};
use hotfire::logger::{CsvRunLogger, JsonLinesLogger, RunLogger};
use hotfire::sensors::conversion::{
    force_to_raw, pressure_bar, pressure_to_voltage, temperature_c, temperature_to_voltage,
};
use hotfire::sensors::{QuantityKind, SimulatedDaq, VoltageProfile};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::Level;

const DEFAULT_LOG_PATH: &str = "dataDAQ.csv";
const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
const SCENARIOS: &[&str] = &["nominal", "overpressure", "overtemp", "overforce", "overrun"];

const EXIT_FATAL: i32 = 1;
const EXIT_CONFIG: i32 = 2;

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("hotfire")
        .version("0.1.0")
        .author("Propulsion Test Engineering Team")
        .about("🔥 Static fire controller - valve sequencing with hard abort limits")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Firing configuration (JSON); test-stand defaults when omitted")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("🚀 Execute a firing sequence")
                .long_about("Opens valve 1, opens valve 2 after the configured delay and closes both at the end of the fire duration or on the first limit breach. Press ENTER or Ctrl-C during the run to abort.")
                .arg(
                    Arg::with_name("log")
                        .short("l")
                        .long("log")
                        .value_name("FILE")
                        .help("Run log path (.csv, or .jsonl for JSON lines)")
                        .takes_value(true)
                        .default_value(DEFAULT_LOG_PATH),
                )
                .arg(
                    Arg::with_name("scenario")
                        .short("s")
                        .long("scenario")
                        .value_name("SCENARIO")
                        .help("Transducer profile played by the simulated acquisition board")
                        .takes_value(true)
                        .possible_values(SCENARIOS)
                        .default_value("nominal"),
                )
                .arg(
                    Arg::with_name("gpio")
                        .long("gpio")
                        .help("Drive the real valve relays through sysfs GPIO"),
                )
                .arg(
                    Arg::with_name("gpio-root")
                        .long("gpio-root")
                        .value_name("DIR")
                        .help("sysfs GPIO directory")
                        .takes_value(true)
                        .default_value(DEFAULT_GPIO_ROOT),
                )
                .arg(
                    Arg::with_name("yes")
                        .short("y")
                        .long("yes")
                        .help("Start firing without waiting for ENTER"),
                ),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("🛠️  Inspect the firing configuration")
                .subcommand(SubCommand::with_name("show").about("Print the effective configuration as JSON"))
                .subcommand(SubCommand::with_name("check").about("Validate the configuration")),
        )
        .subcommand(
            SubCommand::with_name("convert")
                .about("📐 Convert a transducer voltage to physical units")
                .arg(
                    Arg::with_name("quantity")
                        .help("Transducer type")
                        .required(true)
                        .possible_values(&["pressure", "temperature"]),
                )
                .arg(
                    Arg::with_name("volts")
                        .help("Transducer output in volts")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| match v.parse::<f64>() {
                            Ok(value) if value.is_finite() => Ok(()),
                            _ => Err("Voltage must be a finite number".into()),
                        }),
                ),
        )
        .get_matches();

    // Global options land on whichever level they were given at.
    let (_, sub) = matches.subcommand();
    let global = |name: &str| sub.and_then(|m| m.value_of(name)).or_else(|| matches.value_of(name));
    let format = global("format").unwrap_or("table").to_string();
    let config_path = global("config").map(str::to_string);
    let verbose = matches.is_present("verbose") || sub.is_some_and(|m| m.is_present("verbose"));

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match matches.subcommand() {
        ("run", Some(sub_matches)) => {
            let code = handle_run(sub_matches, config_path.as_deref(), &format).await?;
            std::process::exit(code);
        }
        ("config", Some(sub_matches)) => {
            let code = handle_config(sub_matches, config_path.as_deref());
            std::process::exit(code);
        }
        ("convert", Some(sub_matches)) => {
            handle_convert(sub_matches, &format)?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Dry run with simulated hardware", "hotfire run".bright_cyan());
            println!("  {} Show the active limits", "hotfire config show".bright_cyan());
            println!("  {} Convert a reading", "hotfire convert pressure 1.2".bright_cyan());
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<FiringConfig, ConfigError> {
    match path {
        Some(path) => FiringConfig::load(path),
        None => {
            let config = FiringConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn handle_run(
    matches: &ArgMatches<'_>,
    config_path: Option<&str>,
    format: &str,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
            return Ok(EXIT_CONFIG);
        }
    };

    let scenario = matches.value_of("scenario").unwrap_or("nominal");
    let log_path = matches.value_of("log").unwrap_or(DEFAULT_LOG_PATH);
    let clock = MonotonicClock::new();

    let daq = simulated_daq(&config, scenario, clock);
    let valves: Box<dyn ValveActuator + Send> = if matches.is_present("gpio") {
        let root = matches.value_of("gpio-root").unwrap_or(DEFAULT_GPIO_ROOT);
        let relays = SysfsGpioValves::with_root(root, config.valves);
        if let Err(e) = relays.setup() {
            eprintln!("{} {}", "❌".red(), format!("Valve relay setup failed: {e}").bright_red());
            return Ok(EXIT_FATAL);
        }
        Box::new(relays)
    } else {
        Box::new(SimulatedValves::new())
    };
    let logger = match open_run_log(log_path) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), format!("Cannot create run log {log_path}: {e}").bright_red());
            return Ok(EXIT_FATAL);
        }
    };

    print_run_summary(&config, scenario, log_path, matches.is_present("gpio"));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    if !matches.is_present("yes") {
        println!("\n{}", "Press ENTER to start firing...".bright_yellow().bold());
        if stdin.next_line().await?.is_none() {
            println!("{}", "No operator confirmation, firing not started.".yellow());
            return Ok(EXIT_FATAL);
        }
    }

    let cancel = CancelToken::new();
    let watcher = tokio::spawn(watch_for_abort(stdin, cancel.clone()));

    let controller = FiringController::new(config, clock)?;
    println!("{}", "🔥 Firing started! Press ENTER or Ctrl-C to abort.".bright_red().bold());

    let outcome = tokio::task::spawn_blocking(move || {
        let mut daq = daq;
        let mut valves = valves;
        let mut logger = logger;
        controller.run(&mut daq, &mut valves, &mut logger, &cancel)
    })
    .await?;
    watcher.abort();

    match outcome {
        Ok(report) => {
            print_report(&report, format)?;
            Ok(report.exit_code())
        }
        Err(e) => {
            eprintln!("{} {}", "❌".red(), format!("Firing failed: {e}").bright_red());
            println!("{}", "End of sequence, valves closed".bright_white());
            Ok(EXIT_FATAL)
        }
    }
}

/// Ctrl-C or an ENTER keypress requests cancellation. A closed stdin is
/// not a request; only Ctrl-C remains in that case.
async fn watch_for_abort(mut stdin: StdinLines, cancel: CancelToken) {
    let keypress = async {
        match stdin.next_line().await {
            Ok(Some(_)) => {}
            _ => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = keypress => {}
    }
    cancel.cancel();
}

fn open_run_log(path: &str) -> Result<Box<dyn RunLogger + Send>, Box<dyn std::error::Error>> {
    let json = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("json"));
    if json {
        Ok(Box::new(JsonLinesLogger::create(path)?))
    } else {
        Ok(Box::new(CsvRunLogger::create(path)?))
    }
}

fn simulated_daq(config: &FiringConfig, scenario: &str, clock: MonotonicClock) -> SimulatedDaq<MonotonicClock> {
    let t = config.thresholds;
    let fire = Duration::from_secs_f64(t.fire_duration_s);
    let mut daq = SimulatedDaq::new(clock);

    for channel in &config.channels {
        let profile = match (channel.kind, scenario) {
            (QuantityKind::Pressure, "overpressure") => VoltageProfile::Ramp {
                start: pressure_to_voltage(t.max_pressure_bar * 0.5),
                end: pressure_to_voltage(t.max_pressure_bar * 1.2),
                over: fire.mul_f64(0.6),
            },
            (QuantityKind::Pressure, _) => VoltageProfile::Constant(pressure_to_voltage(t.max_pressure_bar * 0.6)),
            (QuantityKind::Temperature, "overtemp") => VoltageProfile::Step {
                before: temperature_to_voltage(t.max_temperature_c - 10.0),
                after: temperature_to_voltage(t.max_temperature_c + 5.0),
                at: fire.mul_f64(0.5),
            },
            (QuantityKind::Temperature, _) => {
                VoltageProfile::Constant(temperature_to_voltage(t.max_temperature_c - 10.0))
            }
            (QuantityKind::Force, "overforce") => VoltageProfile::Ramp {
                start: force_to_raw(0.0, &config.load_cell),
                end: force_to_raw(t.max_force_kg * 1.5, &config.load_cell),
                over: fire.mul_f64(0.5),
            },
            (QuantityKind::Force, _) => VoltageProfile::Constant(force_to_raw(t.max_force_kg * 0.5, &config.load_cell)),
        };
        daq = daq.with_profile(channel.id, profile);
    }

    if scenario == "overrun" {
        daq = daq.with_buffer_overrun_at(fire.mul_f64(0.4));
    }
    daq
}

fn print_run_summary(config: &FiringConfig, scenario: &str, log_path: &str, gpio: bool) {
    let t = &config.thresholds;
    println!("{}", "🔥 Hotfire - static fire sequence".bright_blue().bold());
    println!("{}", "=================================".bright_blue());
    println!("{} {}", "Acquisition:".bright_white(), format!("simulated board ({scenario})").bright_cyan());
    println!(
        "{} {}",
        "Valves:".bright_white(),
        if gpio {
            format!("sysfs GPIO {} / {}", config.valves.valve1_gpio, config.valves.valve2_gpio).bright_red()
        } else {
            "simulated".bright_cyan()
        }
    );
    for channel in &config.channels {
        println!("    Channel {}: {}", channel.id, channel.kind);
    }
    println!("    Scan rate: {:.2} Hz, poll every {} ms", config.scan_rate_hz, config.poll_interval_ms);
    println!("{}", "Limits:".bright_white());
    println!("    Pressure:    {:.2} bar", t.max_pressure_bar);
    println!("    Temperature: {:.2} °C", t.max_temperature_c);
    println!("    Weight:      {:.2} kg", t.max_force_kg);
    println!("    Fire time:   {:.2} s (valve 2 after {:.2} s)", t.fire_duration_s, t.valve2_open_delay_s);
    println!("{} {}", "Run log:".bright_white(), log_path);
}

fn print_report(report: &RunReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    if report.is_nominal() {
        println!("{} {}", "✅".green(), "Firing completed!".bright_green().bold());
    } else if report.reason.is_limit_breach() {
        println!("{} {}", "🛑".red(), format!("Run aborted: {}", report.reason).bright_red().bold());
    } else {
        println!("{} {}", "⚠️ ".yellow(), format!("Run aborted: {}", report.reason).bright_yellow().bold());
    }
    println!("{} {:.3} s", "Elapsed:".bright_white(), report.elapsed.as_secs_f64());
    for transition in &report.transitions {
        println!(
            "    {:>7.3} s  {:?} -> {:?}{}",
            transition.elapsed.as_secs_f64(),
            transition.from,
            transition.to,
            transition.reason.map(|r| format!(" ({r})")).unwrap_or_default()
        );
    }

    let stats = &report.stats;
    println!("{}", "Statistics:".bright_white());
    println!("    Polls:            {}", stats.batches);
    println!("    Samples drained:  {}", stats.samples_drained);
    println!("    Readings checked: {}", stats.readings_processed);
    println!("    Records logged:   {}", stats.records_logged);
    if stats.log_failures > 0 {
        println!("    {}", format!("Log failures:     {}", stats.log_failures).yellow());
    }
    if stats.valve_write_failures > 0 {
        println!("    {}", format!("Valve write errors: {}", stats.valve_write_failures).red());
    }

    for valve in ValveId::ALL {
        let state = match report.valve(valve) {
            ValveState::Closed => "closed".bright_green(),
            ValveState::Open => "OPEN".bright_red().bold(),
        };
        println!("{} {}", format!("{valve}:").bright_white(), state);
    }
    println!("{}", "End of sequence, valves closed".bright_white());
    Ok(())
}

fn handle_config(matches: &ArgMatches<'_>, config_path: Option<&str>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
            return EXIT_CONFIG;
        }
    };

    match matches.subcommand() {
        ("show", _) => match config.to_json_pretty() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
                return EXIT_CONFIG;
            }
        },
        ("check", _) => {
            println!("{} {}", "✅".green(), "Configuration is valid".bright_green());
        }
        _ => {
            println!("{}", "Config subcommand required. Use 'hotfire config --help' for options.".yellow());
        }
    }
    0
}

fn handle_convert(matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let volts: f64 = matches.value_of("volts").unwrap_or("0").parse()?;
    let (kind, value) = match matches.value_of("quantity") {
        Some("temperature") => (QuantityKind::Temperature, temperature_c(volts)),
        _ => (QuantityKind::Pressure, pressure_bar(volts)),
    };

    if format == "json" {
        let out = serde_json::json!({
            "quantity": kind,
            "volts": volts,
            "value": value,
            "unit": kind.unit().to_string(),
        });
        println!("{out}");
    } else {
        println!("{:.5} V -> {} {}", volts, format!("{value:.2}").bright_green(), kind.unit());
    }
    Ok(())
}
