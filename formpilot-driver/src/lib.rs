//! Browser control for Formpilot: a WebDriver session hardened against
//! automated-traffic detection, plus the [`traits::PageDriver`] seam the
//! pipeline is written against so runs can be exercised without a browser.
pub mod behavioral;
pub mod fingerprint;
pub mod pool;
pub mod session;
pub mod stealth;
pub mod traits;

pub use pool::{ContextPermit, ContextPool};
pub use session::StealthSession;
pub use traits::{FieldLocator, PageDriver, RawElement};
