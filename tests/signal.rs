use std::time::Duration;

use bft_simple::diagnostics::{Signal, SignalWatch};
use rustix::process::{getpid, kill_process};
use tokio::time::timeout;

// registering the watch replaces the default disposition, so the test process
// survives delivering these to itself
#[tokio::test]
async fn delivered_signals_reach_watch() {
    let mut watch = SignalWatch::register().unwrap();

    kill_process(getpid(), rustix::process::Signal::Term).unwrap();
    let signal = timeout(Duration::from_secs(5), watch.recv()).await.unwrap();
    assert_eq!(signal, Signal::Terminate);

    kill_process(getpid(), rustix::process::Signal::Int).unwrap();
    let signal = timeout(Duration::from_secs(5), watch.recv()).await.unwrap();
    assert_eq!(signal, Signal::Interrupt);
}
