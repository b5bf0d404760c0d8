//! Command routing
//!
//! Turns one inbound chat line into at most one outbound [`Action`]. Access
//! checks, gate decisions and whitelist persistence all happen here; the
//! caller only delivers the result.

use super::commands::{match_command, single_argument, CommandKind};
use crate::access_list::{same_identity, AccessList};
use crate::config::{Settings, EMOTE};
use crate::image_api::ImageSource;
use crate::rate_limit::{PrivateGate, RateGate};
use crate::utils::format_uptime;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Maximum number of recipients tracked by the private gate
pub const PRIVATE_GATE_CAPACITY: u64 = 10_000;

/// Outbound result of routing one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Post to the room
    Public(String),
    /// Whisper to one user
    Private {
        /// Recipient
        target: String,
        /// Message text
        text: String,
    },
    /// Nothing to send
    NoOp,
}

/// Routes chat commands and owns the state they act on
pub struct CommandRouter {
    access: RwLock<AccessList>,
    public_gate: Mutex<RateGate>,
    admin_gate: Mutex<RateGate>,
    private_gate: PrivateGate,
    images: Arc<dyn ImageSource>,
    source_url: String,
    ping_trigger: String,
    started_at: Instant,
}

impl CommandRouter {
    /// Create a router over a loaded access list
    #[must_use]
    pub fn new(access: AccessList, images: Arc<dyn ImageSource>, settings: &Settings) -> Self {
        Self {
            access: RwLock::new(access),
            public_gate: Mutex::new(RateGate::new(settings.public_cooldown())),
            admin_gate: Mutex::new(RateGate::new(settings.admin_cooldown())),
            private_gate: PrivateGate::new(settings.private_cooldown(), PRIVATE_GATE_CAPACITY),
            images,
            source_url: settings.source_url.clone(),
            ping_trigger: settings.ping_trigger.clone(),
            started_at: Instant::now(),
        }
    }

    /// Decide the reply to `text` sent by `sender`.
    ///
    /// Anything that is not a known command yields [`Action::NoOp`] without
    /// side effects.
    pub async fn route(&self, sender: &str, text: &str) -> Action {
        let Some(kind) = match_command(text) else {
            return Action::NoOp;
        };

        match kind {
            CommandKind::Lookup => self.lookup(sender).await,
            CommandKind::Whitelist => self.whitelist(sender, text).await,
            CommandKind::Blacklist => self.blacklist(sender, text).await,
            CommandKind::Source => self.source().await,
            CommandKind::Uptime => self.uptime(sender).await,
            CommandKind::RateLimit => self.rate_limit(sender, text).await,
            CommandKind::Ping => self.ping(sender),
        }
    }

    async fn lookup(&self, sender: &str) -> Action {
        let whitelisted = self.access.read().await.is_whitelisted(sender);

        if whitelisted {
            // No point hitting the API when the room is cooling down
            if self.public_gate.lock().await.is_cooling(Instant::now()) {
                return Action::NoOp;
            }
            let Some(url) = self.fetch_url().await else {
                return Action::NoOp;
            };
            return self.admit_public(format!("{EMOTE} {url} {EMOTE}")).await;
        }

        if self.private_gate.is_cooling(sender, Instant::now()).await {
            return Action::NoOp;
        }
        let Some(url) = self.fetch_url().await else {
            return Action::NoOp;
        };
        if !self.private_gate.try_admit(sender, Instant::now()).await {
            return Action::NoOp;
        }
        Action::Private {
            target: sender.to_string(),
            text: format!("Look like you're not whitelisted, have a pm ferret: {url}"),
        }
    }

    async fn whitelist(&self, sender: &str, text: &str) -> Action {
        let Some(target) = self.admin_argument(sender, text).await else {
            return Action::NoOp;
        };

        let reply = {
            let mut access = self.access.write().await;
            if access.add(target) {
                info!("{} whitelisted {}", sender, target);
                persist(&access);
                format!("{target} whitelisted {EMOTE}")
            } else {
                format!("{target} already whitelisted {EMOTE}")
            }
        };

        self.admin_reply(sender, reply).await
    }

    async fn blacklist(&self, sender: &str, text: &str) -> Action {
        let Some(target) = self.admin_argument(sender, text).await else {
            return Action::NoOp;
        };

        let reply = {
            let mut access = self.access.write().await;
            if access.remove(target) {
                info!("{} removed {} from the whitelist", sender, target);
                persist(&access);
                format!("{target} removed from whitelist {EMOTE}")
            } else {
                format!("{target} not whitelisted {EMOTE}")
            }
        };

        self.admin_reply(sender, reply).await
    }

    async fn source(&self) -> Action {
        self.admit_public(format!("{EMOTE} {} {EMOTE}", self.source_url))
            .await
    }

    async fn uptime(&self, sender: &str) -> Action {
        if !self.is_admin(sender).await {
            return Action::NoOp;
        }

        let text = format!("{EMOTE} Uptime: {}", format_uptime(self.started_at.elapsed()));
        // Dedup only: uptime does not hold the room's cooldown
        if self.public_gate.lock().await.try_admit_unique(&text) {
            Action::Public(text)
        } else {
            Action::NoOp
        }
    }

    async fn rate_limit(&self, sender: &str, text: &str) -> Action {
        let Some(arg) = self.admin_argument(sender, text).await else {
            return Action::NoOp;
        };
        let Ok(secs) = arg.parse::<u64>() else {
            return Action::NoOp;
        };

        self.public_gate
            .lock()
            .await
            .set_cooldown(Duration::from_secs(secs));
        info!("{} set the public cooldown to {}s", sender, secs);

        self.admin_reply(sender, format!("rate limit set to {secs}s {EMOTE}"))
            .await
    }

    fn ping(&self, sender: &str) -> Action {
        if same_identity(sender, &self.ping_trigger) {
            Action::Public(EMOTE.to_string())
        } else {
            Action::NoOp
        }
    }

    /// Argument of an admin command, or `None` if the sender is not an admin
    /// or the argument count is wrong.
    async fn admin_argument<'t>(&self, sender: &str, text: &'t str) -> Option<&'t str> {
        if !self.is_admin(sender).await {
            return None;
        }
        single_argument(text)
    }

    async fn is_admin(&self, sender: &str) -> bool {
        self.access.read().await.is_admin(sender)
    }

    async fn fetch_url(&self) -> Option<String> {
        match self.images.fetch_url().await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Image lookup failed: {}", e);
                None
            }
        }
    }

    async fn admit_public(&self, text: String) -> Action {
        if self.public_gate.lock().await.try_admit(&text, Instant::now()) {
            Action::Public(text)
        } else {
            Action::NoOp
        }
    }

    /// Post an admin reply publicly, falling back to a whisper to the admin
    /// when the room gate refuses it.
    async fn admin_reply(&self, admin: &str, text: String) -> Action {
        if self.public_gate.lock().await.try_admit(&text, Instant::now()) {
            return Action::Public(text);
        }
        if self.admin_gate.lock().await.try_admit(&text, Instant::now()) {
            return Action::Private {
                target: admin.to_string(),
                text,
            };
        }
        Action::NoOp
    }

    /// Current whitelist
    pub async fn whitelist_snapshot(&self) -> Vec<String> {
        self.access.read().await.whitelist().to_vec()
    }

    /// Current cooldown of the room
    pub async fn public_cooldown(&self) -> Duration {
        self.public_gate.lock().await.cooldown()
    }
}

fn persist(access: &AccessList) {
    if let Err(e) = access.save() {
        error!("Failed to save access list: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_api::{ImageApiError, MockImageSource};
    use tempfile::TempDir;

    const URL: &str = "https://i.example/ferret.jpg";

    fn images(times: usize) -> Arc<dyn ImageSource> {
        let mut mock = MockImageSource::new();
        mock.expect_fetch_url()
            .times(times)
            .returning(|| Ok(URL.to_string()));
        Arc::new(mock)
    }

    fn router_with(
        dir: &TempDir,
        whitelist: &[&str],
        images: Arc<dyn ImageSource>,
        settings: &Settings,
    ) -> CommandRouter {
        let access = AccessList::new(
            dir.path().join("config.json"),
            "k",
            vec!["alice".to_string()],
            whitelist.iter().map(|s| (*s).to_string()).collect(),
        );
        CommandRouter::new(access, images, settings)
    }

    fn router(dir: &TempDir, whitelist: &[&str], images: Arc<dyn ImageSource>) -> CommandRouter {
        router_with(dir, whitelist, images, &Settings::default())
    }

    fn relaxed() -> Settings {
        Settings {
            public_cooldown_secs: 0,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_plain_text_is_ignored() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &["bob"], images(0));

        assert_eq!(router.route("bob", "hello ferret").await, Action::NoOp);
        assert_eq!(router.route("bob", "!nope").await, Action::NoOp);
        Ok(())
    }

    #[tokio::test]
    async fn test_whitelisted_lookup_posts_once_per_cooldown() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = TempDir::new()?;
        // Second call must not reach the API at all
        let router = router(&dir, &["bob"], images(1));

        assert_eq!(
            router.route("Bob", "!ferret").await,
            Action::Public(format!("FerretLOL {URL} FerretLOL"))
        );
        assert_eq!(router.route("bob", "!polecat").await, Action::NoOp);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_url_is_suppressed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router_with(&dir, &["bob"], images(2), &relaxed());

        assert!(matches!(router.route("bob", "!ferret").await, Action::Public(_)));
        assert_eq!(router.route("bob", "!ferret").await, Action::NoOp);
        Ok(())
    }

    #[tokio::test]
    async fn test_unlisted_lookup_whispers_nudge() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(1));

        assert_eq!(
            router.route("eve", "!ferret").await,
            Action::Private {
                target: "eve".to_string(),
                text: format!("Look like you're not whitelisted, have a pm ferret: {URL}"),
            }
        );
        assert_eq!(router.route("eve", "!ferret").await, Action::NoOp);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_noop() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let mut mock = MockImageSource::new();
        mock.expect_fetch_url()
            .times(2)
            .returning(|| Err(ImageApiError::Status(500)));
        let router = router(&dir, &["bob"], Arc::new(mock));

        assert_eq!(router.route("bob", "!ferret").await, Action::NoOp);
        assert_eq!(router.route("eve", "!ferret").await, Action::NoOp);
        // Failed lookups leave the room gate untouched
        assert!(matches!(
            router.route("alice", "!fsource").await,
            Action::Public(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_whitelists_and_persists() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(
            router.route("alice", "!fwhitelist bob").await,
            Action::Public("bob whitelisted FerretLOL".to_string())
        );
        assert_eq!(router.whitelist_snapshot().await, vec!["bob".to_string()]);

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("config.json"))?)?;
        assert_eq!(written["whitelist"], serde_json::json!(["bob"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_whitelist_reports_existing_entry() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = TempDir::new()?;
        let router = router_with(&dir, &[], images(0), &relaxed());

        let first = router.route("alice", "!fwhitelist bob").await;
        let second = router.route("alice", "!fwhitelist BOB").await;

        assert_eq!(first, Action::Public("bob whitelisted FerretLOL".to_string()));
        assert_eq!(
            second,
            Action::Public("BOB already whitelisted FerretLOL".to_string())
        );
        assert_eq!(router.whitelist_snapshot().await, vec!["bob".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_reply_falls_back_to_whisper() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert!(matches!(
            router.route("alice", "!fwhitelist bob").await,
            Action::Public(_)
        ));
        assert_eq!(
            router.route("alice", "!fwhitelist bob").await,
            Action::Private {
                target: "alice".to_string(),
                text: "bob already whitelisted FerretLOL".to_string(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_non_admin_cannot_whitelist() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(router.route("eve", "!fwhitelist bob").await, Action::NoOp);
        assert!(router.whitelist_snapshot().await.is_empty());
        assert!(!dir.path().join("config.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_commands_need_exactly_one_argument(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &["bob"], images(0));

        assert_eq!(router.route("alice", "!fwhitelist").await, Action::NoOp);
        assert_eq!(router.route("alice", "!fwhitelist a b").await, Action::NoOp);
        assert_eq!(router.route("alice", "!fblacklist").await, Action::NoOp);
        assert_eq!(router.whitelist_snapshot().await, vec!["bob".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_blacklist() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router_with(&dir, &["Bob", "carol"], images(0), &relaxed());

        assert_eq!(
            router.route("alice", "!fblacklist bob").await,
            Action::Public("bob removed from whitelist FerretLOL".to_string())
        );
        assert_eq!(router.whitelist_snapshot().await, vec!["carol".to_string()]);
        assert_eq!(
            router.route("alice", "!fblacklist bob").await,
            Action::Public("bob not whitelisted FerretLOL".to_string())
        );

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("config.json"))?)?;
        assert_eq!(written["whitelist"], serde_json::json!(["carol"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_source_is_gated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(
            router.route("anyone", "!fsource").await,
            Action::Public("FerretLOL https://github.com/voloshink/FerretBot FerretLOL".to_string())
        );
        assert_eq!(router.route("anyone", "!fsource").await, Action::NoOp);
        Ok(())
    }

    #[tokio::test]
    async fn test_uptime_is_admin_only_and_skips_cooldown() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(router.route("eve", "!fuptime").await, Action::NoOp);

        let Action::Public(text) = router.route("alice", "!fuptime").await else {
            panic!("expected a public uptime reply");
        };
        assert!(text.starts_with("FerretLOL Uptime: "));

        // The room is still open for the next command
        assert!(matches!(router.route("x", "!fsource").await, Action::Public(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_changes_cooldown() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(router.route("eve", "!fratelimit 5").await, Action::NoOp);
        assert_eq!(router.route("alice", "!fratelimit soon").await, Action::NoOp);
        assert_eq!(router.public_cooldown().await, Duration::from_secs(60));

        assert_eq!(
            router.route("alice", "!fratelimit 5").await,
            Action::Public("rate limit set to 5s FerretLOL".to_string())
        );
        assert_eq!(router.public_cooldown().await, Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_ping_only_answers_trigger() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let router = router(&dir, &[], images(0));

        assert_eq!(router.route("eve", "!ping").await, Action::NoOp);
        assert_eq!(
            router.route("PoleCat", "!ping").await,
            Action::Public("FerretLOL".to_string())
        );
        // Not gated
        assert_eq!(
            router.route("polecat", "!ping").await,
            Action::Public("FerretLOL".to_string())
        );
        Ok(())
    }
}
