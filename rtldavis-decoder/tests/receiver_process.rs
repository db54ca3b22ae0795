// Supervisor and driver against a scripted stand-in receiver
#![cfg(target_os = "linux")]

use rtldavis_decoder::supervisor::find_instances;
use rtldavis_decoder::{DecoderError, Driver, DriverConfig, LaunchOptions, ProcessSupervisor};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Copy of /bin/sh under a unique short name, plus a script for it to run
struct FakeReceiver {
    _dir: TempDir,
    shell: PathBuf,
    script: PathBuf,
}

impl FakeReceiver {
    fn new(tag: &str, script: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let shell = dir.path().join(format!("rtl{}{}", tag, std::process::id()));
        fs::copy("/bin/sh", &shell).unwrap();
        let script_path = dir.path().join("receiver.sh");
        fs::write(&script_path, script).unwrap();
        Self {
            _dir: dir,
            shell,
            script: script_path,
        }
    }

    fn name(&self) -> String {
        file_name(&self.shell)
    }

    fn command_line(&self) -> String {
        format!("{} {}", self.shell.display(), self.script.display())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

const DATA_LOOP: &str = r#"
i=0
echo "rtldavis stand-in"
while :; do
    i=$((i+1))
    echo "13:44:13.116046 5106B2FF73007661 $i 0 0 0" >&2
    sleep 0.2
done
"#;

#[test]
fn test_supervisor_streams_and_shuts_down() {
    let fake = FakeReceiver::new("s", DATA_LOOP);
    let options = LaunchOptions::from_command_line(&fake.command_line(), None, None).unwrap();
    assert_eq!(options.process_name(), fake.name());

    let mut supervisor = ProcessSupervisor::startup(options).unwrap();
    let pid = supervisor.pid().unwrap();
    assert!(supervisor.running());
    assert!(find_instances(&fake.name()).contains(&pid));

    let mut stderr = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while stderr.len() < 3 && Instant::now() < deadline {
        stderr.extend(supervisor.drain_stderr(Duration::from_millis(500)));
    }
    assert!(stderr.len() >= 3);
    assert!(stderr[0].ends_with(" 1 0 0 0\n"));
    assert!(stderr[1].ends_with(" 2 0 0 0\n"));

    let stdout = supervisor.drain_stdout();
    assert_eq!(stdout, vec!["rtldavis stand-in\n".to_string()]);

    supervisor.shutdown();
    assert!(!supervisor.running());
    assert!(find_instances(&fake.name()).is_empty());

    // at most one line was in flight when the process was killed
    thread::sleep(Duration::from_millis(300));
    supervisor.drain_stderr(Duration::ZERO);
    thread::sleep(Duration::from_millis(700));
    assert!(supervisor.drain_stderr(Duration::ZERO).is_empty());

    // idempotent
    supervisor.shutdown();
}

#[test]
fn test_supervisor_environment_overrides() {
    let script = "echo \"PATH=$PATH\"\necho \"LD_LIBRARY_PATH=$LD_LIBRARY_PATH\"\nwhile :; do sleep 1; done\n";
    let fake = FakeReceiver::new("e", script);
    let options = LaunchOptions::from_command_line(
        &fake.command_line(),
        Some(PathBuf::from("/opt/rtldavis/bin")),
        Some(PathBuf::from("/opt/rtldavis/lib")),
    )
    .unwrap();

    let mut supervisor = ProcessSupervisor::startup(options).unwrap();
    let mut stdout = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while stdout.len() < 2 && Instant::now() < deadline {
        supervisor.drain_stderr(Duration::from_millis(200));
        stdout.extend(supervisor.drain_stdout());
    }
    supervisor.shutdown();
    assert_eq!(stdout.len(), 2);

    let path = stdout[0].trim_end().strip_prefix("PATH=").unwrap();
    assert!(path.starts_with("/opt/rtldavis/bin:"), "PATH={}", path);
    assert_eq!(stdout[1].trim_end(), "LD_LIBRARY_PATH=/opt/rtldavis/lib");
}

#[test]
fn test_driver_decodes_receiver_output() {
    let fake = FakeReceiver::new("d", DATA_LOOP);
    let config = DriverConfig::new()
        .with_cmd(fake.command_line())
        .with_channels(2, 0, 0, 0, 0)
        .with_drain_timeout(1);

    let mut driver = Driver::start(&config).unwrap();
    assert!(driver.command_line().ends_with(" -tf EU -tr 2"));

    let mut packets = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while packets.len() < 2 && Instant::now() < deadline {
        packets.extend(driver.poll().unwrap());
    }
    assert!(packets.len() >= 2);
    assert!(packets[0].get("windSpeed").is_some());

    driver.shutdown();
    assert!(!driver.is_running());
    assert!(find_instances(&fake.name()).is_empty());
    assert!(matches!(driver.poll(), Err(DecoderError::ProcessDied)));
}

#[test]
fn test_driver_detects_exit() {
    let fake = FakeReceiver::new("x", "echo \"Init channels\" >&2\nexit 3\n");
    let config = DriverConfig::new()
        .with_cmd(fake.command_line())
        .with_drain_timeout(1);

    let mut driver = Driver::start(&config).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = loop {
        match driver.poll() {
            Ok(packets) => assert!(packets.is_empty()),
            Err(e) => break e,
        }
        assert!(Instant::now() < deadline, "exit not detected");
    };
    assert!(matches!(err, DecoderError::ProcessDied));
    assert!(!driver.is_running());
}

#[test]
fn test_driver_detects_stall() {
    let fake = FakeReceiver::new("t", "while :; do sleep 1; done\n");
    let config = DriverConfig::new()
        .with_cmd(fake.command_line())
        .with_stall_timeout(1)
        .with_drain_timeout(1);

    let mut driver = Driver::start(&config).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = loop {
        match driver.poll() {
            Ok(packets) => assert!(packets.is_empty()),
            Err(e) => break e,
        }
        assert!(Instant::now() < deadline, "stall not detected");
    };
    assert!(matches!(err, DecoderError::ProcessStalled(_)));
    assert!(err.is_fatal());
    assert!(!driver.is_running());
    assert!(find_instances(&fake.name()).is_empty());
}

#[test]
fn test_driver_stops_on_radio_error() {
    let script = "echo \"Hop: {ChannelIdx:1 ChannelFreq:868171250 FreqError:25000}\" >&2\nwhile :; do sleep 1; done\n";
    let fake = FakeReceiver::new("r", script);
    let config = DriverConfig::new()
        .with_cmd(fake.command_line())
        .with_drain_timeout(1);

    let mut driver = Driver::start(&config).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = loop {
        match driver.poll() {
            Ok(packets) => assert!(packets.is_empty()),
            Err(e) => break e,
        }
        assert!(Instant::now() < deadline, "radio error not reported");
    };
    assert!(matches!(
        err,
        DecoderError::ReceiverRadio { channel: 1, freq_error: 25000 }
    ));
    assert!(!driver.is_running());
}
