//! Command payloads.
//!
//! Every command is a compact JSON object with an integer `action`
//! selector followed by the action's own fields.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::frame::{build_frame, CommandFrame, FRAME_KIND_JSON};
use crate::protocol::keys::ActiveKey;

/// Fields of a [`Command::SetSettings`] command. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    /// Account user identifier.
    pub user: Option<String>,
    /// Account access token.
    pub token: Option<String>,
    /// Cloud environment selector.
    pub api_env_type: Option<String>,
    /// Wi-Fi network name.
    pub ssid: Option<String>,
    /// Wi-Fi passphrase.
    pub passwd: Option<String>,
}

impl Settings {
    /// Wi-Fi credentials only.
    pub fn wifi(ssid: impl Into<String>, passwd: impl Into<String>) -> Self {
        Self {
            ssid: Some(ssid.into()),
            passwd: Some(passwd.into()),
            ..Self::default()
        }
    }

    /// Set the cloud environment selector.
    pub fn with_api_env_type(mut self, env: impl ToString) -> Self {
        self.api_env_type = Some(env.to_string());
        self
    }

    /// Set fields under their wire names, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        [
            ("user", &self.user),
            ("token", &self.token),
            ("apiEnvType", &self.api_env_type),
            ("ssid", &self.ssid),
            ("passwd", &self.passwd),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
    }
}

/// A command understood by the frame firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Wipe settings and return to factory state.
    FactoryReset,
    /// Update account and network settings.
    SetSettings(Settings),
    /// Restart the frame.
    Reboot,
    /// Liveness probe.
    Hello,
    /// Fetch and display the current content from the cloud.
    Fetch,
    /// Scan for Wi-Fi networks.
    ScanNetworks,
    /// Run the panel ghosting cleaner.
    GhostingCleaner,
}

impl Command {
    /// Numeric `action` selector.
    pub fn action(&self) -> u8 {
        match self {
            Self::FactoryReset => 1,
            Self::SetSettings(_) => 2,
            Self::Reboot => 3,
            Self::Hello => 41,
            Self::Fetch => 42,
            Self::ScanNetworks => 43,
            Self::GhostingCleaner => 44,
        }
    }

    /// Human-readable command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FactoryReset => "factory_reset",
            Self::SetSettings(_) => "set_settings",
            Self::Reboot => "reboot",
            Self::Hello => "hello",
            Self::Fetch => "fetch",
            Self::ScanNetworks => "scan_networks",
            Self::GhostingCleaner => "ghosting_cleaner",
        }
    }

    /// Whether the frame is expected to drop the link after executing this command.
    pub fn restarts_device(&self) -> bool {
        matches!(self, Self::Reboot | Self::FactoryReset)
    }

    /// Encode the JSON payload.
    ///
    /// The object is compact and `action` always comes first.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let mut object = format!("{{\"action\":{}", self.action());
        if let Self::SetSettings(settings) = self {
            for (name, value) in settings.fields() {
                object.push_str(&format!(",\"{}\":{}", name, serde_json::to_string(value)?));
            }
        }
        object.push('}');
        Ok(object.into_bytes())
    }

    /// Encode and authenticate this command.
    pub fn to_frame(&self, counter: u16, key: &ActiveKey) -> Result<CommandFrame> {
        let payload = self.to_payload()?;
        Ok(build_frame(FRAME_KIND_JSON, &payload, counter, key))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (action {})", self.name(), self.action())
    }
}
