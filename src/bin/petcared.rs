//! petcared - smart pet care controller daemon
//!
//! This daemon:
//! 1. Loads configuration (PETCARE_CONFIG JSON plus env overrides)
//! 2. Loads one model backend per capability (ONNX or stub)
//! 3. Pulls an audio clip from the configured source every cycle
//! 4. Runs the decision cycle: presence on motion, sound and emotion, food level
//! 5. Feeds, closes the door, captures alerts, and publishes telemetry over MQTT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use petcare::audio::open_source;
use petcare::config::PetCareConfig;
use petcare::devices::{CommandCamera, FixedSensors, LoggingActuator, StaticCamera};
use petcare::inference::build_registry;
use petcare::transport::{parse_mqtt_endpoint, MqttSettings, MqttTelemetrySink, TlsMaterials};
use petcare::{Camera, CycleContext, CycleIo, LogSink, Pipeline, TelemetrySink};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about = "Smart pet care controller daemon")]
struct Args {
    /// Write telemetry to the log instead of an MQTT broker.
    #[arg(long, env = "PETCARE_LOG_TELEMETRY")]
    log_telemetry: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Stop after this many cycles.
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = PetCareConfig::load()?;
    log::info!(
        "petcared starting: audio={} policy={:?} debounce={:?} interval={:?}",
        cfg.audio.source,
        cfg.emotion_policy,
        cfg.debounce,
        cfg.cycle_interval
    );

    let registry = build_registry(
        &cfg.models,
        cfg.audio.frame_size,
        cfg.audio.embedding_input,
    )?;
    registry.warm_up_all()?;
    let mut pipeline = Pipeline::new(&cfg.pipeline_settings(), &registry)?;

    let mut source = open_source(&cfg.audio.source, cfg.audio.capture_window)?;
    log::info!("audio source: {}", source.name());

    let mut camera: Box<dyn Camera> = match &cfg.camera.static_image {
        Some(image) => Box::new(StaticCamera::new(image, &cfg.camera.snapshot_dir)),
        None => {
            let camera = CommandCamera::new(&cfg.camera.program, &cfg.camera.snapshot_dir);
            match &cfg.camera.args {
                Some(args) => Box::new(camera.with_args(args.clone())),
                None => Box::new(camera),
            }
        }
    };
    let mut actuator = LoggingActuator::new();
    let mut sensors = FixedSensors::new(
        cfg.bench.food_distance_cm,
        cfg.bench.door_distance_cm,
        cfg.bench.motion,
    );

    let mut mqtt_sink = None;
    let mut log_sink = LogSink::new();
    if !args.log_telemetry {
        mqtt_sink = Some(connect_mqtt(&cfg)?);
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let max_cycles = if args.once { Some(1) } else { args.max_cycles };
    let mut ctx = CycleContext::new();
    log::info!("petcared running");

    while running.load(Ordering::SeqCst) {
        if max_cycles.is_some_and(|max| ctx.cycles >= max) {
            break;
        }
        let started = Instant::now();

        match source.next_clip() {
            Ok(clip) => {
                let sink: &mut dyn TelemetrySink = match mqtt_sink.as_mut() {
                    Some(sink) => sink,
                    None => &mut log_sink,
                };
                let mut io = CycleIo {
                    camera: camera.as_mut(),
                    actuator: &mut actuator,
                    sensors: &mut sensors,
                    sink,
                };
                match pipeline.run_cycle(&mut ctx, &mut io, &clip) {
                    Ok(report) => {
                        for note in &report.notes {
                            log::warn!("cycle {}: {}", report.cycle, note);
                        }
                    }
                    Err(e) => log::error!("cycle {} aborted: {}", ctx.cycles, e),
                }
            }
            Err(e) => log::error!("audio source {} failed: {}", source.name(), e),
        }

        while running.load(Ordering::SeqCst) && started.elapsed() < cfg.cycle_interval {
            if max_cycles.is_some_and(|max| ctx.cycles >= max) {
                break;
            }
            std::thread::sleep(SHUTDOWN_POLL.min(cfg.cycle_interval));
        }
    }

    log::info!("shutting down after {} cycles", ctx.cycles);
    if let Some(sink) = mqtt_sink {
        sink.shutdown()?;
    }
    Ok(())
}

fn connect_mqtt(cfg: &PetCareConfig) -> Result<MqttTelemetrySink> {
    let endpoint = parse_mqtt_endpoint(&cfg.mqtt.broker_addr, cfg.mqtt.tls)?;
    let tls = TlsMaterials::load(
        cfg.mqtt.ca_path.as_ref(),
        cfg.mqtt.client_cert_path.as_ref(),
        cfg.mqtt.client_key_path.as_ref(),
    )?;
    let settings = MqttSettings {
        endpoint,
        tls,
        client_id: cfg.mqtt.client_id.clone(),
        username: cfg.mqtt.username.clone(),
        password: cfg.mqtt.password.clone(),
        topic: cfg.mqtt.topic.clone(),
        keep_alive: cfg.mqtt.keep_alive,
    };
    MqttTelemetrySink::connect(&settings)
}
