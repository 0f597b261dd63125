//! Launching must not stall the executor while the launcher is searched for
//!
//! This binary replaces `which` on PATH, so it holds a single test.

#![cfg(unix)]
#![allow(unsafe_code)]

use dictation_supervisor::config::LauncherConfig;
use dictation_supervisor::{Collaborators, State, Supervisor, SupervisorConfig, UiNotification, UiSurface};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct Quiet;

impl UiSurface for Quiet {
    fn notify(&self, _notification: UiNotification) {}
}

#[smol_potat::test]
async fn test_slow_path_lookup_runs_off_the_executor() {
    let dir = tempfile::tempdir().unwrap();
    let which = dir.path().join("which");
    std::fs::write(&which, "#!/bin/sh\nsleep 1\nexit 1\n").unwrap();
    std::fs::set_permissions(&which, std::fs::Permissions::from_mode(0o755)).unwrap();

    let path = format!(
        "{}:{}",
        dir.path().display(),
        std::env::var("PATH").unwrap_or_default()
    );
    // SAFETY: the only test in this binary; nothing else reads the environment concurrently.
    unsafe { std::env::set_var("PATH", path) };

    let config = SupervisorConfig {
        launcher: LauncherConfig {
            name: "dictation-launcher-that-does-not-exist".to_string(),
            path: None,
            search_timeout_secs: 5,
        },
        ..SupervisorConfig::default()
    };
    let mut supervisor = Supervisor::new(config, Collaborators::new(Arc::new(Quiet)));

    // Both futures share this thread; a blocking lookup would starve the ticker.
    let opened = AtomicBool::new(false);
    let (state, ticks) = smol::future::zip(
        async {
            let state = supervisor.open().await.state();
            opened.store(true, Ordering::SeqCst);
            state
        },
        async {
            let mut ticks = 0;
            while !opened.load(Ordering::SeqCst) {
                smol::Timer::after(Duration::from_millis(20)).await;
                ticks += 1;
            }
            ticks
        },
    )
    .await;

    assert_eq!(state, State::Dead);
    assert!(ticks >= 5, "only {ticks} ticks during a one second lookup");
    supervisor.close().await;
}
