use std::path::PathBuf;

/// Default location of the Aperio AT2 source profile.
pub const DEFAULT_AT2_PROFILE: &str = "/opt/AT2.icm";

/// Default location of the Aperio ScanScope v1 source profile.
pub const DEFAULT_SCANSCOPE_PROFILE: &str = "/opt/ScanScope v1.icm";

/// Scanner color profiles with a known source ICC asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerProfile {
    At2,
    ScanScopeV1,
}

impl ScannerProfile {
    pub const ALL: [ScannerProfile; 2] = [ScannerProfile::At2, ScannerProfile::ScanScopeV1];

    /// Map a slide's declared profile name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "AT2" => Some(ScannerProfile::At2),
            "ScanScope v1" => Some(ScannerProfile::ScanScopeV1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScannerProfile::At2 => "AT2",
            ScannerProfile::ScanScopeV1 => "ScanScope v1",
        }
    }
}

/// Where the ICC assets live on disk.
///
/// Without a destination path the built-in sRGB profile is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub at2: PathBuf,
    pub scanscope_v1: PathBuf,
    pub destination: Option<PathBuf>,
}

impl ProfilePaths {
    pub fn source(&self, profile: ScannerProfile) -> &PathBuf {
        match profile {
            ScannerProfile::At2 => &self.at2,
            ScannerProfile::ScanScopeV1 => &self.scanscope_v1,
        }
    }
}

impl Default for ProfilePaths {
    fn default() -> Self {
        Self {
            at2: PathBuf::from(DEFAULT_AT2_PROFILE),
            scanscope_v1: PathBuf::from(DEFAULT_SCANSCOPE_PROFILE),
            destination: None,
        }
    }
}
