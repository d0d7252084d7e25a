mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Rig;
use ticklink_host::HostError;
use ticklink_protocol::{
    Command, Direction, DriveAction, ErrorCode, MotorSetup, MotorState, OutputSymbol,
    PROTOCOL_VERSION,
};

#[test]
fn test_connect_and_drive() {
    let bench = Rig::default().start();
    let session = &bench.session;

    session.free().unwrap();
    session
        .drive(0, DriveAction::Run(Direction::Forward), Some(0x32))
        .unwrap();
    let report = session.motor_status(0).unwrap();
    assert_eq!(report.state, MotorState::Running(Direction::Forward));
    assert_eq!(report.duty, 0x7f);
    assert!(report.counter.is_none());
}

#[test]
fn test_reconnect_reports_version() {
    let bench = Rig::default().start();
    assert_eq!(bench.session.connect().unwrap(), PROTOCOL_VERSION);
    assert_eq!(bench.session.ping(Some("abc")).unwrap().as_deref(), Some("abc"));
    assert_eq!(bench.session.ping(None).unwrap(), None);
}

#[test]
fn test_mode_error_surfaces_and_session_survives() {
    let bench = Rig::default().start();
    let session = &bench.session;

    let err = session
        .drive(0, DriveAction::Run(Direction::Forward), None)
        .unwrap_err();
    assert_eq!(err.device_error().map(|e| e.code), Some(ErrorCode::Mode));

    session.free().unwrap();
    session
        .drive(0, DriveAction::Run(Direction::Reverse), None)
        .unwrap();
    assert_eq!(session.motor_status(0).unwrap().duty, 0xff);
}

#[test]
fn test_outputs_and_counts() {
    let bench = Rig::default().start();
    let session = &bench.session;

    session.free().unwrap();
    let echo = session
        .set_outputs([
            OutputSymbol::On,
            OutputSymbol::Off,
            OutputSymbol::Keep,
            OutputSymbol::Level(2),
            OutputSymbol::Level(4),
            OutputSymbol::Level(0),
        ])
        .unwrap();
    assert_eq!(echo.to_string(), "set:+--2+-");

    let counts = session.query_counts(None).unwrap();
    assert_eq!(&counts.0[..], &[0, 0]);
    assert_eq!(&session.query_counts(Some(1)).unwrap().0[..], &[0]);
}

#[test]
fn test_time_advances() {
    let bench = Rig::default().start();
    let first = bench.session.time().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(bench.session.time().unwrap() > first);
}

#[test]
fn test_calibrate_and_apply() {
    let bench = Rig::default().start();
    let session = &bench.session;

    session.configure(&[MotorSetup::new(0, Some(0))]).unwrap();
    let polarity = session.check_polarity(0).unwrap();
    assert!(polarity.forward > 0 && polarity.reverse > 0);

    let report = session.calibrate(0).unwrap();
    assert_eq!(report.samples.len(), 10);
    assert!(report.minima.iter().all(|&m| m >= 20));
    assert!(report.samples.windows(2).all(|w| w[0].ticks[0] <= w[1].ticks[0]));

    let setup = report.setup(Some(0));
    session.configure(&[setup]).unwrap();
    session.free().unwrap();
    session
        .drive(0, DriveAction::Run(Direction::Forward), Some(100))
        .unwrap();
    assert_eq!(session.motor_status(0).unwrap().duty, 0xff);
}

#[test]
fn test_calibrate_unwired_channel_fails() {
    let bench = Rig::default().start();
    let session = &bench.session;

    // Motor 2 has no encoder on the board
    session.configure(&[MotorSetup::new(2, Some(1))]).unwrap();
    let err = session.calibrate(2).unwrap_err();
    assert!(matches!(
        err,
        HostError::CalibrationFailed {
            channel: 2,
            direction: Some(Direction::Forward),
            step: None,
        }
    ));
    // Nothing left pending
    session.call(&Command::Ping(None)).unwrap();
}

#[test]
fn test_calibration_failure_reports_step() {
    let session = common::scripted(|line| match line {
        "cal:0" => vec!["cal:0:run", "cal:0:min:30:30", "cal:0:fail:r:3", "err-cal-1"],
        _ => vec!["rdy"],
    });
    let err = session.calibrate(0).unwrap_err();
    assert!(
        matches!(
            err,
            HostError::CalibrationFailed {
                channel: 0,
                direction: Some(Direction::Reverse),
                step: Some(3),
            }
        ),
        "{:?}",
        err
    );
    // The session is idle again
    session.call(&Command::Ping(None)).unwrap();
}

#[test]
fn test_subscribers_see_traps() {
    let bench = Rig::default().start();
    let session = &bench.session;
    let traps = Arc::new(AtomicUsize::new(0));
    let seen = traps.clone();
    session.subscribe(move |event| {
        assert_eq!(event.motor(), 1);
        seen.fetch_add(1, Ordering::SeqCst);
    });

    session.configure(&[MotorSetup::new(1, Some(1))]).unwrap();
    session.free().unwrap();
    session.servo(1, Direction::Forward, 0x20, None).unwrap();
    session.wait_servo(&[1]).unwrap();

    // Subscribers run after waiters are released
    let deadline = Instant::now() + Duration::from_secs(1);
    while traps.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(traps.load(Ordering::SeqCst), 1);
}
