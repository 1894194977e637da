//! The watcher loop.
//!
//! Polls the signal file, coordinates with peer hosts through the lock
//! directory, and drives login handling according to the current mode.
//! Every concluded attempt feeds back into the signal and cooldown files
//! so consumers and other watchers see a consistent picture.

pub mod login;
pub mod notify;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aws::resolve_sso_session;
use crate::config::Settings;
use crate::refresh::TokenRefresher;
use crate::state::{epoch_now, CooldownFile, LoginLock, Mode, ModeStore, SignalChannel};

pub use login::{CliLogin, LoginLauncher, LoginResult};
pub use notify::{HeadlessNotify, Notify, NotifyAction};

/// Retry hint written back to the signal after a failed attempt. Short on
/// purpose: transient failures (network blips, closed browser tabs) should
/// not wait out the full cooldown.
const FAIL_SNOOZE_SECONDS: u64 = 30;

/// How a lock-holding login attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Fail,
    Snoozed(u64),
    Suppressed,
    Dismissed,
}

pub struct Watcher {
    profile: String,
    aws_config_file: PathBuf,
    poll_interval: Duration,
    cooldown_period: Duration,
    proactive_interval: Duration,
    proactive_window: chrono::Duration,
    signal: SignalChannel,
    lock: LoginLock,
    modes: ModeStore,
    cooldown: CooldownFile,
    refresher: TokenRefresher,
    notifier: Arc<dyn Notify>,
    launcher: Arc<dyn LoginLauncher>,
    last_proactive: Option<Instant>,
}

impl Watcher {
    pub fn new(
        settings: &Settings,
        refresher: TokenRefresher,
        notifier: Arc<dyn Notify>,
        launcher: Arc<dyn LoginLauncher>,
    ) -> Self {
        Self {
            profile: settings.profile.clone(),
            aws_config_file: settings.aws_config_file.clone(),
            poll_interval: settings.poll_interval,
            cooldown_period: settings.cooldown,
            proactive_interval: settings.proactive_interval,
            proactive_window: chrono::Duration::seconds(settings.proactive_window.as_secs() as i64),
            signal: SignalChannel::new(settings.signal_file.clone()),
            lock: LoginLock::new(settings.lock_dir()),
            modes: ModeStore::new(settings.mode_file(), settings.mode_env_default.clone()),
            cooldown: CooldownFile::new(settings.cooldown_file()),
            refresher,
            notifier,
            launcher,
            last_proactive: None,
        }
    }

    pub async fn run(mut self) {
        info!(
            profile = %self.profile,
            signal = %self.signal.path().display(),
            "watcher started"
        );
        loop {
            self.tick().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll iteration. Mode is re-read every time so `mode` commands
    /// and file edits take effect without a restart.
    pub async fn tick(&mut self) {
        let mode = self.modes.read();
        if mode == Mode::Standalone {
            debug!("standalone mode, another host owns login handling");
            return;
        }
        if self.signal.exists() {
            self.handle_signal(mode).await;
        } else {
            self.maybe_proactive_refresh().await;
        }
    }

    async fn handle_signal(&self, mode: Mode) {
        let record = self.signal.read().unwrap_or_default();
        let profile = record
            .profile
            .clone()
            .unwrap_or_else(|| self.profile.clone());

        if let Some(after) = record.next_attempt_after {
            if epoch_now() < after {
                debug!(profile, "snoozed, next attempt not due yet");
                return;
            }
        }
        if !self.cooldown.elapsed(self.cooldown_period.as_secs_f64()) {
            debug!(profile, "cooldown active, holding off");
            return;
        }
        // The guard releases the lock on drop, whatever way this scope exits
        let Some(_guard) = self.lock.try_acquire() else {
            debug!(profile, "another watcher holds the login lock");
            return;
        };

        let outcome = self.attempt_login(mode, &profile).await;
        self.apply_outcome(&profile, outcome);
    }

    /// Runs with the lock held. A silent refresh is always tried first:
    /// when the refresh token is still good there is no reason to bother
    /// anyone with a browser flow.
    async fn attempt_login(&self, mode: Mode, profile: &str) -> Outcome {
        if self.refresher.refresh(profile).await {
            return Outcome::Success;
        }
        match mode {
            // Standalone never reaches here; treated like silent if it does
            Mode::Silent | Mode::Standalone => Outcome::Fail,
            Mode::Auto => self.launch(profile).await,
            Mode::Notify => match self.notifier.ask(profile).await {
                NotifyAction::Refresh => self.launch(profile).await,
                NotifyAction::Snooze(seconds) => Outcome::Snoozed(seconds),
                NotifyAction::Suppress => Outcome::Suppressed,
                NotifyAction::Dismiss => Outcome::Dismissed,
            },
        }
    }

    async fn launch(&self, profile: &str) -> Outcome {
        match self.launcher.login(profile).await {
            LoginResult::Success => Outcome::Success,
            LoginResult::Failed | LoginResult::TimedOut => Outcome::Fail,
        }
    }

    /// Side effects per conclusion. The cooldown only advances for attempts
    /// the user concluded (success, suppress, dismiss); failures and
    /// snoozes reschedule through the signal itself so recovery is fast.
    fn apply_outcome(&self, profile: &str, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                info!(profile, "credentials restored");
                self.signal.clear();
                self.cooldown.touch();
            }
            Outcome::Fail => {
                warn!(profile, retry_secs = FAIL_SNOOZE_SECONDS, "login attempt failed");
                if let Err(e) = self.signal.snooze(FAIL_SNOOZE_SECONDS) {
                    warn!(error = %e, "could not reschedule signal");
                }
            }
            Outcome::Snoozed(seconds) => {
                info!(profile, seconds, "login snoozed");
                if let Err(e) = self.signal.snooze(seconds) {
                    warn!(error = %e, "could not reschedule signal");
                }
            }
            Outcome::Suppressed => {
                info!(profile, "login suppressed until credentials change again");
                self.signal.clear();
                self.cooldown.touch();
            }
            Outcome::Dismissed => {
                info!(profile, "prompt dismissed, cooldown applies");
                self.cooldown.touch();
            }
        }
    }

    /// Quiet renewal ahead of the checker: when no signal is pending and
    /// the watched profile's token is inside the proactive window, refresh
    /// it in place. Failures stay silent; raising signals is the checker's
    /// job.
    async fn maybe_proactive_refresh(&mut self) {
        if let Some(last) = self.last_proactive {
            if last.elapsed() < self.proactive_interval {
                return;
            }
        }
        self.last_proactive = Some(Instant::now());

        let session = match resolve_sso_session(&self.aws_config_file, &self.profile) {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "proactive check skipped");
                return;
            }
        };
        let Some((_, token)) = self.refresher.store().find_token(&session.start_url) else {
            return;
        };
        let Some(remaining) = token.remaining(Utc::now()) else {
            return;
        };
        if remaining >= self.proactive_window {
            return;
        }
        debug!(profile = %self.profile, "token inside proactive window");
        self.refresher.refresh(&self.profile).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SentinelError;
    use crate::refresh::test_support::FakeOidc;
    use crate::token::TokenStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const START_URL: &str = "https://test.awsapps.com/start";

    struct FakeNotify(NotifyAction);

    #[async_trait]
    impl Notify for FakeNotify {
        async fn ask(&self, _profile: &str) -> NotifyAction {
            self.0
        }
    }

    struct FakeLauncher {
        result: LoginResult,
        calls: Mutex<Vec<String>>,
    }

    impl FakeLauncher {
        fn new(result: LoginResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LoginLauncher for FakeLauncher {
        async fn login(&self, profile: &str) -> LoginResult {
            self.calls.lock().unwrap().push(profile.to_string());
            self.result
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
        cache_dir: PathBuf,
    }

    impl Fixture {
        fn signal(&self) -> SignalChannel {
            SignalChannel::new(self.settings.signal_file.clone())
        }

        fn cooldown_set(&self) -> bool {
            self.settings.cooldown_file().exists()
        }

        fn set_mode(&self, mode: &str) {
            std::fs::write(self.settings.mode_file(), mode).unwrap();
        }

        fn seed_token(&self, expires_in_secs: i64) {
            let store = TokenStore::new(self.cache_dir.clone());
            let path = store.token_path(START_URL);
            std::fs::write(
                &path,
                serde_json::json!({
                    "startUrl": START_URL,
                    "accessToken": "old-access",
                    "refreshToken": "old-refresh",
                    "clientId": "cid",
                    "clientSecret": "csecret",
                    "registrationExpiresAt": "2099-01-01T00:00:00Z",
                    "expiresAt": (Utc::now() + chrono::Duration::seconds(expires_in_secs))
                        .format("%Y-%m-%dT%H:%M:%SZ")
                        .to_string(),
                })
                .to_string(),
            )
            .unwrap();
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let config_file = dir.path().join("config");
        std::fs::write(
            &config_file,
            "[profile work]\n\
             sso_session = s\n\
             [sso-session s]\n\
             sso_start_url = https://test.awsapps.com/start\n\
             sso_region = us-west-2\n",
        )
        .unwrap();

        let settings = Settings {
            profile: "work".to_string(),
            aws_config_file: config_file,
            sso_cache_dir: cache_dir.clone(),
            state_dir: state_dir.clone(),
            signal_file: state_dir.join("login-required.json"),
            poll_interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(600),
            check_interval: Duration::from_secs(900),
            renewal_threshold: Duration::from_secs(3600),
            proactive_interval: Duration::from_secs(300),
            proactive_window: Duration::from_secs(3600),
            login_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            mode_env_default: None,
        };
        Fixture {
            _dir: dir,
            settings,
            cache_dir,
        }
    }

    fn watcher(
        fixture: &Fixture,
        oidc: FakeOidc,
        action: NotifyAction,
        launcher: Arc<FakeLauncher>,
    ) -> Watcher {
        let refresher = TokenRefresher::new(
            fixture.settings.aws_config_file.clone(),
            TokenStore::new(fixture.cache_dir.clone()),
            Arc::new(oidc),
        );
        Watcher::new(
            &fixture.settings,
            refresher,
            Arc::new(FakeNotify(action)),
            launcher,
        )
    }

    fn failing_oidc() -> FakeOidc {
        FakeOidc::failing(SentinelError::GrantInvalid("invalid_grant".into()))
    }

    #[tokio::test]
    async fn test_scenario_auto_login_success_clears_everything() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 1);
        assert!(!fixture.signal().exists());
        assert!(fixture.cooldown_set());
        assert!(!fixture.settings.lock_dir().exists());
    }

    #[tokio::test]
    async fn test_silent_refresh_resolves_signal_without_login() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let oidc = FakeOidc::succeeding("new-tok", None, 28800);
        let mut watcher = watcher(&fixture, oidc, NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0, "no interactive login when refresh works");
        assert!(!fixture.signal().exists());
        assert!(fixture.cooldown_set());
    }

    #[tokio::test]
    async fn test_scenario_dismiss_keeps_signal_sets_cooldown() {
        let fixture = fixture();
        fixture.set_mode("notify");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Dismiss, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists(), "dismiss keeps the signal");
        assert!(fixture.cooldown_set());
        assert!(!fixture.settings.lock_dir().exists());
    }

    #[tokio::test]
    async fn test_scenario_lock_contention_skips_entirely() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        std::fs::create_dir_all(fixture.settings.lock_dir()).unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists());
        assert!(!fixture.cooldown_set());
        assert!(fixture.settings.lock_dir().exists(), "foreign lock untouched");
    }

    #[tokio::test]
    async fn test_silent_mode_failure_snoozes_without_cooldown() {
        let fixture = fixture();
        fixture.set_mode("silent");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0, "silent mode never launches a login");
        let record = fixture.signal().read().unwrap();
        let after = record.next_attempt_after.unwrap();
        assert!(after > epoch_now() && after <= epoch_now() + 31.0);
        assert!(!fixture.cooldown_set(), "failures do not consume the cooldown");
        assert!(!fixture.settings.lock_dir().exists());
    }

    #[tokio::test]
    async fn test_login_failure_snoozes_and_releases_lock() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Failed);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 1);
        assert!(fixture.signal().read().unwrap().next_attempt_after.is_some());
        assert!(!fixture.cooldown_set());
        assert!(!fixture.settings.lock_dir().exists(), "lock released after failure");
    }

    struct PanickingLauncher;

    #[async_trait]
    impl LoginLauncher for PanickingLauncher {
        async fn login(&self, _profile: &str) -> LoginResult {
            panic!("login backend crashed");
        }
    }

    #[tokio::test]
    async fn test_lock_released_when_launcher_panics() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let refresher = TokenRefresher::new(
            fixture.settings.aws_config_file.clone(),
            TokenStore::new(fixture.cache_dir.clone()),
            Arc::new(failing_oidc()),
        );
        let mut watcher = Watcher::new(
            &fixture.settings,
            refresher,
            Arc::new(FakeNotify(NotifyAction::Refresh)),
            Arc::new(PanickingLauncher),
        );

        let handle = tokio::spawn(async move { watcher.tick().await });
        assert!(handle.await.is_err(), "launcher panic propagates");
        assert!(
            !fixture.settings.lock_dir().exists(),
            "lock must not outlive the unwound holder"
        );
    }

    #[tokio::test]
    async fn test_notify_snooze_reschedules() {
        let fixture = fixture();
        fixture.set_mode("notify");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher =
            watcher(&fixture, failing_oidc(), NotifyAction::Snooze(900), launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        let record = fixture.signal().read().unwrap();
        assert_eq!(record.profile.as_deref(), Some("work"));
        let after = record.next_attempt_after.unwrap();
        assert!(after > epoch_now() + 890.0 && after <= epoch_now() + 901.0);
        assert!(!fixture.cooldown_set());
    }

    #[tokio::test]
    async fn test_notify_suppress_clears_signal() {
        let fixture = fixture();
        fixture.set_mode("notify");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher =
            watcher(&fixture, failing_oidc(), NotifyAction::Suppress, launcher.clone());

        watcher.tick().await;

        assert!(!fixture.signal().exists());
        assert!(fixture.cooldown_set());
    }

    #[tokio::test]
    async fn test_standalone_ignores_signal() {
        let fixture = fixture();
        fixture.set_mode("standalone");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists());
        assert!(!fixture.cooldown_set());
    }

    #[tokio::test]
    async fn test_mode_toggle_takes_effect_next_tick() {
        let fixture = fixture();
        fixture.set_mode("standalone");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;
        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists());

        fixture.set_mode("auto");
        watcher.tick().await;

        assert_eq!(launcher.call_count(), 1);
        assert!(!fixture.signal().exists());
    }

    #[tokio::test]
    async fn test_future_next_attempt_skips() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        let signal = fixture.signal();
        signal.raise("work", "refresh failed").unwrap();
        signal.snooze(300).unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists());
    }

    #[tokio::test]
    async fn test_active_cooldown_skips() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("work", "refresh failed").unwrap();
        CooldownFile::new(fixture.settings.cooldown_file()).touch();
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.call_count(), 0);
        assert!(fixture.signal().exists());
    }

    #[tokio::test]
    async fn test_proactive_refresh_inside_window() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(1800); // inside the 3600s window
        let launcher = FakeLauncher::new(LoginResult::Success);
        let oidc = FakeOidc::succeeding("proactive-tok", None, 28800);
        let mut watcher = watcher(&fixture, oidc, NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        let store = TokenStore::new(fixture.cache_dir.clone());
        let (_, token) = store.find_token(START_URL).unwrap();
        assert_eq!(token.access_token, "proactive-tok");
        assert_eq!(launcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_proactive_skips_healthy_token() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(7200); // outside the window
        let launcher = FakeLauncher::new(LoginResult::Success);
        let oidc = FakeOidc::succeeding("should-not-be-used", None, 28800);
        let mut watcher = watcher(&fixture, oidc, NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        let store = TokenStore::new(fixture.cache_dir.clone());
        let (_, token) = store.find_token(START_URL).unwrap();
        assert_eq!(token.access_token, "old-access");
    }

    #[tokio::test]
    async fn test_proactive_failure_raises_no_signal() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(1800);
        let launcher = FakeLauncher::new(LoginResult::Success);
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert!(!fixture.signal().exists(), "proactive failures stay quiet");
        assert_eq!(launcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_signal_names_profile_over_default() {
        let fixture = fixture();
        fixture.set_mode("auto");
        fixture.seed_token(60);
        fixture.signal().raise("other-prof", "refresh failed").unwrap();
        let launcher = FakeLauncher::new(LoginResult::Success);
        // Refresh fails for the unknown profile, so the launcher gets it
        let mut watcher = watcher(&fixture, failing_oidc(), NotifyAction::Refresh, launcher.clone());

        watcher.tick().await;

        assert_eq!(launcher.calls.lock().unwrap().as_slice(), ["other-prof"]);
    }
}
