use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trapper_edge::{
    CycleOutcome, CycleStats, Engine, EnvironmentReading, MeasurementSource, MetricKeys,
    SendError, SenderConfig, SensorError, TrapperSender,
};

/// Source that replays a fixed script of results.
struct ScriptedSensor {
    script: VecDeque<Result<EnvironmentReading, SensorError>>,
}

impl ScriptedSensor {
    fn new(script: Vec<Result<EnvironmentReading, SensorError>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl MeasurementSource for ScriptedSensor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        self.script.pop_front().unwrap_or(Err(SensorError::NoUsableReadings))
    }
}

fn reading(temperature_c: f64) -> EnvironmentReading {
    EnvironmentReading {
        temperature_c,
        humidity_pct: 50.0,
        pressure_hpa: 1013.25,
    }
}

/// Acknowledges every frame and forwards its payload.
async fn spawn_server() -> (SocketAddr, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut header = [0u8; 13];
            if stream.read_exact(&mut header).await.is_err() {
                continue;
            }
            let len = u16::from_le_bytes([header[5], header[6]]) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).await.unwrap();
            stream.write_all(b"OK\r").await.unwrap();

            if tx.send(String::from_utf8(payload).unwrap()).await.is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

fn sender(addr: SocketAddr) -> TrapperSender {
    TrapperSender::new(SenderConfig {
        server: addr.ip().to_string(),
        port: addr.port(),
        host: "station".to_string(),
        response_timeout: Duration::from_secs(2),
        ..Default::default()
    })
}

#[tokio::test]
async fn run_once_sends_the_four_keyed_values() {
    let (addr, mut payloads) = spawn_server().await;

    let keys = MetricKeys {
        temperature: "t".into(),
        humidity: "h".into(),
        pressure: "p".into(),
        altitude: "a".into(),
    };
    let mut engine =
        Engine::new(ScriptedSensor::new(vec![Ok(reading(19.5))]), sender(addr)).with_keys(keys);

    let outcome = engine.run_once().await;
    assert!(outcome.is_sent(), "{outcome:?}");

    let payload = payloads.recv().await.unwrap();
    assert_eq!(
        payload,
        concat!(
            r#"{"request":"sender data","data":["#,
            r#"{"host":"station","key":"t","value":"19.5"},"#,
            r#"{"host":"station","key":"h","value":"50"},"#,
            r#"{"host":"station","key":"p","value":"1013.25"},"#,
            r#"{"host":"station","key":"a","value":"0"}]}"#
        )
    );
}

#[tokio::test]
async fn reference_pressure_shifts_altitude() {
    let (addr, mut payloads) = spawn_server().await;

    let mut engine = Engine::new(ScriptedSensor::new(vec![Ok(reading(20.0))]), sender(addr))
        .with_reference_pressure(1013.25 * 1.1);

    engine.run_once().await;

    let payload: serde_json::Value =
        serde_json::from_str(&payloads.recv().await.unwrap()).unwrap();
    let altitude: f64 = payload["data"][3]["value"].as_str().unwrap().parse().unwrap();
    assert!(altitude > 700.0 && altitude < 900.0, "{altitude}");
}

#[tokio::test]
async fn sensor_failure_skips_the_cycle() {
    let (addr, mut payloads) = spawn_server().await;

    let mut engine = Engine::new(
        ScriptedSensor::new(vec![
            Err(SensorError::InvalidData {
                channel: "in_temp_input",
                raw: "".into(),
            }),
            Ok(EnvironmentReading {
                temperature_c: f64::NAN,
                humidity_pct: f64::NAN,
                pressure_hpa: f64::NAN,
            }),
        ]),
        sender(addr),
    );

    assert!(matches!(
        engine.run_once().await,
        CycleOutcome::Skipped(SensorError::InvalidData { .. })
    ));
    assert!(matches!(
        engine.run_once().await,
        CycleOutcome::Skipped(SensorError::NoUsableReadings)
    ));

    assert_eq!(
        engine.stats(),
        CycleStats {
            sent: 0,
            failed: 0,
            skipped: 2
        }
    );
    assert!(payloads.try_recv().is_err());
}

#[tokio::test]
async fn send_failure_is_reported_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut engine = Engine::new(ScriptedSensor::new(vec![Ok(reading(20.0))]), sender(addr));

    assert!(matches!(
        engine.run_once().await,
        CycleOutcome::Failed(SendError::ConnectionFailed { .. })
    ));
    assert_eq!(engine.stats().failed, 1);
}

#[tokio::test]
async fn run_ticks_until_cancelled() {
    let (addr, mut payloads) = spawn_server().await;

    let engine = Engine::new(
        ScriptedSensor::new(vec![Ok(reading(20.0)), Ok(reading(21.0)), Ok(reading(22.0))]),
        sender(addr),
    )
    .with_interval(Duration::from_millis(50));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancel.clone()));

    for expected in ["20", "21", "22"] {
        let payload = tokio::time::timeout(Duration::from_secs(2), payloads.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(payload.contains(&format!(r#""value":"{expected}""#)), "{payload}");
    }

    cancel.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.sent, 3);
}

#[tokio::test]
async fn zero_interval_runs_at_the_minimum_period() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // empty script: every tick is a skipped cycle, no network involved
    let engine = Engine::new(ScriptedSensor::new(Vec::new()), sender(addr))
        .with_interval(Duration::ZERO);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("engine did not stop")
        .expect("engine panicked");

    assert!(stats.skipped >= 1, "{stats:?}");
    assert_eq!(stats.sent + stats.failed, 0);
}
