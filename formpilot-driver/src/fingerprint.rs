use rand::prelude::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Snapshot of user agent, viewport, and locale characteristics. Chosen once
/// per browser context and held constant for the whole Application Run.
pub struct FingerprintProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
    pub timezone: String,
}

#[derive(Debug, Clone)]
/// Maintains a small pool of plausible desktop fingerprint profiles.
///
/// Viewports are jittered a little on selection so two contexts sharing a
/// base profile still differ in window geometry.
pub struct FingerprintPool {
    desktop_profiles: Vec<FingerprintProfile>,
    current_session_profile: Option<FingerprintProfile>,
}

impl Default for FingerprintPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintPool {
    /// Create a new pool with built-in desktop profiles.
    pub fn new() -> Self {
        Self {
            desktop_profiles: vec![
                FingerprintProfile {
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                    viewport: (1920, 1080),
                    platform: "Win32".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                    timezone: "America/New_York".to_string(),
                },
                FingerprintProfile {
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                    viewport: (1440, 900),
                    platform: "MacIntel".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                    timezone: "America/Los_Angeles".to_string(),
                },
                FingerprintProfile {
                    user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                    viewport: (1680, 1050),
                    platform: "Linux x86_64".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                    timezone: "Europe/Berlin".to_string(),
                },
            ],
            current_session_profile: None,
        }
    }

    /// Get (or lazily select) the current session profile.
    pub fn session_profile(&mut self) -> &FingerprintProfile {
        if self.current_session_profile.is_none() {
            let mut rng = rand::thread_rng();
            let mut p = self
                .desktop_profiles
                .choose(&mut rng)
                .expect("profile pool is never empty")
                .clone();
            // jitter within a plausible window range
            p.viewport.0 = p.viewport.0.saturating_sub(rng.gen_range(0..=120));
            p.viewport.1 = p.viewport.1.saturating_sub(rng.gen_range(0..=80));
            self.current_session_profile = Some(p);
        }
        self.current_session_profile.as_ref().unwrap()
    }
}
