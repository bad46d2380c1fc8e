use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn oedexport(tmp: &Path) -> Command {
    let mut cmd = Command::cargo_bin("oedexport").unwrap();
    cmd.arg("--config")
        .arg(tmp.join("config.toml"))
        .arg("--db")
        .arg(tmp.join("readings.db"))
        .arg("--out")
        .arg(tmp.join("out"));
    cmd
}

fn write_readings(tmp: &Path, rows: usize) -> std::path::PathBuf {
    let mut csv = String::from("reading,start_timestamp,end_timestamp\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "{i},2023-01-01T{:02}:00:00Z,2023-01-01T{:02}:00:00Z\n",
            i,
            i + 1
        ));
    }
    let path = tmp.join(format!("readings-{rows}.csv"));
    fs::write(&path, csv).unwrap();
    path
}

#[test]
fn chart_export_writes_one_file_per_dataset() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("datasets.json");
    fs::write(
        &input,
        r#"[
          {"label": "M1", "unit": "kWh", "currentChart": "line",
           "exportVals": [{"x": "2023-01-02T00:00:00Z", "y": 5}, {"x": "2023-01-01T00:00:00Z", "y": 3}]},
          {"label": "M2", "unit": "kWh", "currentChart": "line",
           "exportVals": [{"x": "2023-01-01T00:00:00Z", "y": 1}]}
        ]"#,
    )
    .unwrap();

    oedexport(tmp.path())
        .arg("chart")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "oedExport_line_January_1_2023_12_00_00_AM_to_January_2_2023_12_00_00_AM_M1_kWh.csv",
        ))
        .stdout(predicate::str::contains("_M2_kWh.csv"));

    assert_eq!(fs::read_dir(tmp.path().join("out")).unwrap().count(), 2);
}

#[test]
fn chart_export_rejects_empty_series() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("datasets.json");
    fs::write(
        &input,
        r#"[{"label": "M1", "unit": "kWh", "currentChart": "bar", "exportVals": []}]"#,
    )
    .unwrap();

    oedexport(tmp.path())
        .arg("chart")
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no points"));
}

#[test]
fn import_then_raw_export() {
    let tmp = TempDir::new().unwrap();
    let readings = write_readings(tmp.path(), 4);

    oedexport(tmp.path())
        .args(["import", "--meter", "Gym", "--unit", "kWh", "--file"])
        .arg(&readings)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 readings"));

    oedexport(tmp.path())
        .arg("meters")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gym\tkWh"));

    oedexport(tmp.path())
        .args(["raw", "--meters", "1", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "oedRawExport_raw_January_1_2023_12_00_00_AM_to_January_1_2023_4_00_00_AM_Gym_kWh.csv",
        ));
}

#[test]
fn raw_export_respects_size_limits() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[export]\nwarning_size = 2\nhard_limit = 3\n",
    )
    .unwrap();
    let small = write_readings(tmp.path(), 3);
    let large = write_readings(tmp.path(), 5);

    oedexport(tmp.path())
        .args(["import", "--meter", "Small", "--unit", "kWh", "--file"])
        .arg(&small)
        .assert()
        .success();
    oedexport(tmp.path())
        .args(["import", "--meter", "Large", "--unit", "kWh", "--file"])
        .arg(&large)
        .assert()
        .success();

    oedexport(tmp.path())
        .args(["raw", "--meters", "1,2", "--no-confirm"])
        .assert()
        .success()
        .stderr(predicate::str::contains("meter 1: export declined"))
        .stderr(predicate::str::contains("meter 2: 5 rows exceeds the limit of 3 rows"));
    assert_eq!(fs::read_dir(tmp.path().join("out")).unwrap().count(), 0);
}

#[test]
fn raw_export_reports_unknown_meter() {
    let tmp = TempDir::new().unwrap();
    oedexport(tmp.path())
        .args(["raw", "--meters", "7", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("meter 7 not found"));
}

#[test]
fn meters_on_empty_store_says_so() {
    let tmp = TempDir::new().unwrap();
    oedexport(tmp.path())
        .arg("meters")
        .assert()
        .success()
        .stderr(predicate::str::contains("no meters imported yet"));
}

#[cfg(unix)]
#[test]
fn ctrl_c_during_confirmation_exits() {
    use assert_cmd::cargo::CommandCargoExt;
    use std::io::Read;
    use std::process::Stdio;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[export]\nwarning_size = 10\nhard_limit = 100\n",
    )
    .unwrap();
    let readings = write_readings(tmp.path(), 20);
    oedexport(tmp.path())
        .args(["import", "--meter", "Gym", "--unit", "kWh", "--file"])
        .arg(&readings)
        .assert()
        .success();

    let mut child = std::process::Command::cargo_bin("oedexport")
        .unwrap()
        .arg("--config")
        .arg(tmp.path().join("config.toml"))
        .arg("--db")
        .arg(tmp.path().join("readings.db"))
        .arg("--out")
        .arg(tmp.path().join("out"))
        .args(["raw", "--meters", "1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // Held open so the confirmation read never sees EOF.
    let _stdin = child.stdin.take().unwrap();
    let mut stderr = child.stderr.take().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 256];
        while let Ok(n) = stderr.read(&mut buf) {
            if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                break;
            }
        }
    });

    let mut seen = String::new();
    let deadline = Instant::now() + Duration::from_secs(30);
    while !seen.contains("[y/N]") {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(chunk) => seen.push_str(&String::from_utf8_lossy(&chunk)),
            Err(_) => {
                let _ = child.kill();
                panic!("confirmation prompt never appeared: {seen}");
            }
        }
    }

    let status = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("process still running after SIGINT");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert!(!exit.success());
}
