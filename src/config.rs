use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
const DEFAULT_PERSON_CLASS_ID: u32 = 0;
const DEFAULT_MIN_AREA: f32 = 500.0;
const DEFAULT_MAX_AREA: f32 = 50_000.0;
const DEFAULT_MIN_WIDTH: f32 = 20.0;
const DEFAULT_MIN_HEIGHT: f32 = 40.0;

const DEFAULT_CROWD_THRESHOLD: usize = 10;
const DEFAULT_FALL_THRESHOLD: f32 = 0.7;
const DEFAULT_FALL_GROUND_FRACTION: f32 = 0.7;
const DEFAULT_FIGHT_PROXIMITY_THRESHOLD: f32 = 1.5;
const DEFAULT_MOVEMENT_THRESHOLD: f32 = 50.0;
const DEFAULT_LOITER_WINDOW: usize = 10;
const DEFAULT_LOITER_MIN_FRAMES: usize = 20;
const DEFAULT_LOITER_MIN_MATCHES: usize = 8;

const DEFAULT_FRAME_BUFFER_SIZE: usize = 30;
const DEFAULT_HISTORY_SIZE: usize = 100;

const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOCATION: &str = "Camera 1";

const DEFAULT_SOURCE_URL: &str = "stub://camera_1";
const DEFAULT_FRAME_SKIP: u32 = 1;
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 30;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;
const MIN_STATS_INTERVAL_SECS: u64 = 30;

// -------------------- File format --------------------

#[derive(Debug, Deserialize, Default)]
struct SafezoneConfigFile {
    detection: Option<DetectionConfigFile>,
    classifiers: Option<ClassifierConfigFile>,
    tracker: Option<TrackerConfigFile>,
    alerts: Option<AlertConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    person_class_id: Option<u32>,
    min_area: Option<f32>,
    max_area: Option<f32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    crowd_threshold: Option<usize>,
    fall_threshold: Option<f32>,
    fall_ground_fraction: Option<f32>,
    fight_proximity_threshold: Option<f32>,
    movement_threshold: Option<f32>,
    loiter_window: Option<usize>,
    loiter_min_frames: Option<usize>,
    loiter_min_matches: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    frame_buffer_size: Option<usize>,
    history_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    endpoint: Option<String>,
    cooldown_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    location: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    frame_skip: Option<u32>,
    reconnect_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    stats_interval_secs: Option<u64>,
}

// -------------------- Resolved settings --------------------

/// Detector output gates applied by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub person_class_id: u32,
    pub min_area: f32,
    pub max_area: f32,
    pub min_width: f32,
    pub min_height: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            person_class_id: DEFAULT_PERSON_CLASS_ID,
            min_area: DEFAULT_MIN_AREA,
            max_area: DEFAULT_MAX_AREA,
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
        }
    }
}

/// Thresholds shared by the event classifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub crowd_threshold: usize,
    /// Width/height ratio above which a box counts as lying down.
    pub fall_threshold: f32,
    /// Fraction of frame height below which a box bottom is "on the ground".
    pub fall_ground_fraction: f32,
    /// Multiplier of person size used for the pair proximity gate.
    pub fight_proximity_threshold: f32,
    /// Pixels.
    pub movement_threshold: f32,
    pub loiter_window: usize,
    pub loiter_min_frames: usize,
    pub loiter_min_matches: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            crowd_threshold: DEFAULT_CROWD_THRESHOLD,
            fall_threshold: DEFAULT_FALL_THRESHOLD,
            fall_ground_fraction: DEFAULT_FALL_GROUND_FRACTION,
            fight_proximity_threshold: DEFAULT_FIGHT_PROXIMITY_THRESHOLD,
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            loiter_window: DEFAULT_LOITER_WINDOW,
            loiter_min_frames: DEFAULT_LOITER_MIN_FRAMES,
            loiter_min_matches: DEFAULT_LOITER_MIN_MATCHES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub frame_buffer_size: usize,
    pub history_size: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            frame_buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    /// Alert ingestion endpoint. Alerts are only logged when unset.
    pub endpoint: Option<String>,
    pub cooldown: Duration,
    /// Total delivery attempts per alert.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub location: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            cooldown: Duration::from_secs(DEFAULT_ALERT_COOLDOWN_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            timeout: Duration::from_secs(DEFAULT_ALERT_TIMEOUT_SECS),
            location: DEFAULT_LOCATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub url: String,
    /// Process every Nth frame read from the source.
    pub frame_skip: u32,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub stats_interval: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            frame_skip: DEFAULT_FRAME_SKIP,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafezoneConfig {
    pub detection: DetectionSettings,
    pub classifiers: ClassifierSettings,
    pub tracker: TrackerSettings,
    pub alerts: AlertSettings,
    pub source: SourceSettings,
}

impl SafezoneConfig {
    /// Loads `SAFEZONE_CONFIG` (if set), applies environment overrides and validates.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAFEZONE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a specific config file, then applies environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SafezoneConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let classifiers = file.classifiers.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let source = file.source.unwrap_or_default();

        Self {
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                person_class_id: detection.person_class_id.unwrap_or(DEFAULT_PERSON_CLASS_ID),
                min_area: detection.min_area.unwrap_or(DEFAULT_MIN_AREA),
                max_area: detection.max_area.unwrap_or(DEFAULT_MAX_AREA),
                min_width: detection.min_width.unwrap_or(DEFAULT_MIN_WIDTH),
                min_height: detection.min_height.unwrap_or(DEFAULT_MIN_HEIGHT),
            },
            classifiers: ClassifierSettings {
                crowd_threshold: classifiers
                    .crowd_threshold
                    .unwrap_or(DEFAULT_CROWD_THRESHOLD),
                fall_threshold: classifiers.fall_threshold.unwrap_or(DEFAULT_FALL_THRESHOLD),
                fall_ground_fraction: classifiers
                    .fall_ground_fraction
                    .unwrap_or(DEFAULT_FALL_GROUND_FRACTION),
                fight_proximity_threshold: classifiers
                    .fight_proximity_threshold
                    .unwrap_or(DEFAULT_FIGHT_PROXIMITY_THRESHOLD),
                movement_threshold: classifiers
                    .movement_threshold
                    .unwrap_or(DEFAULT_MOVEMENT_THRESHOLD),
                loiter_window: classifiers.loiter_window.unwrap_or(DEFAULT_LOITER_WINDOW),
                loiter_min_frames: classifiers
                    .loiter_min_frames
                    .unwrap_or(DEFAULT_LOITER_MIN_FRAMES),
                loiter_min_matches: classifiers
                    .loiter_min_matches
                    .unwrap_or(DEFAULT_LOITER_MIN_MATCHES),
            },
            tracker: TrackerSettings {
                frame_buffer_size: tracker
                    .frame_buffer_size
                    .unwrap_or(DEFAULT_FRAME_BUFFER_SIZE),
                history_size: tracker.history_size.unwrap_or(DEFAULT_HISTORY_SIZE),
            },
            alerts: AlertSettings {
                endpoint: alerts.endpoint.filter(|e| !e.trim().is_empty()),
                cooldown: Duration::from_secs(
                    alerts.cooldown_secs.unwrap_or(DEFAULT_ALERT_COOLDOWN_SECS),
                ),
                max_retries: alerts.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                retry_delay: Duration::from_millis(
                    alerts.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                timeout: Duration::from_secs(
                    alerts.timeout_secs.unwrap_or(DEFAULT_ALERT_TIMEOUT_SECS),
                ),
                location: alerts
                    .location
                    .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            },
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                frame_skip: source.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
                reconnect_attempts: source
                    .reconnect_attempts
                    .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
                reconnect_delay: Duration::from_millis(
                    source
                        .reconnect_delay_ms
                        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
                ),
                stats_interval: Duration::from_secs(
                    source
                        .stats_interval_secs
                        .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = value
                .parse()
                .map_err(|_| anyhow!("CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(value) = env_value("CROWD_THRESHOLD") {
            self.classifiers.crowd_threshold = value
                .parse()
                .map_err(|_| anyhow!("CROWD_THRESHOLD must be a positive integer"))?;
        }
        if let Some(value) = env_value("FRAME_BUFFER_SIZE") {
            self.tracker.frame_buffer_size = value
                .parse()
                .map_err(|_| anyhow!("FRAME_BUFFER_SIZE must be a positive integer"))?;
        }
        if let Some(value) = env_value("ALERT_COOLDOWN_SECS") {
            let seconds: u64 = value.parse().map_err(|_| {
                anyhow!("ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.alerts.cooldown = Duration::from_secs(seconds);
        }
        if let Some(value) = env_value("ALERT_ENDPOINT") {
            self.alerts.endpoint = Some(value);
        }
        if let Some(value) = env_value("SAFEZONE_LOCATION") {
            self.alerts.location = value;
        }
        if let Some(value) = env_value("VIDEO_SOURCE") {
            self.source.url = value;
        }
        if let Some(value) = env_value("FRAME_SKIP") {
            self.source.frame_skip = value
                .parse()
                .map_err(|_| anyhow!("FRAME_SKIP must be a positive integer"))?;
        }
        Ok(())
    }

    /// Rejects settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        let det = &self.detection;
        if !(0.0..=1.0).contains(&det.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0..=1"));
        }
        if det.min_area < 0.0 || det.min_width < 0.0 || det.min_height < 0.0 {
            return Err(anyhow!("detection size bounds must be non-negative"));
        }
        if det.min_area >= det.max_area {
            return Err(anyhow!(
                "min_area ({}) must be below max_area ({})",
                det.min_area,
                det.max_area
            ));
        }

        let cls = &self.classifiers;
        if cls.crowd_threshold == 0 {
            return Err(anyhow!("crowd_threshold must be at least 1"));
        }
        if cls.fall_threshold <= 0.0 {
            return Err(anyhow!("fall_threshold must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&cls.fall_ground_fraction) {
            return Err(anyhow!("fall_ground_fraction must be within 0..=1"));
        }
        if cls.fight_proximity_threshold <= 0.0 || cls.movement_threshold <= 0.0 {
            return Err(anyhow!(
                "fight_proximity_threshold and movement_threshold must be greater than zero"
            ));
        }
        if cls.loiter_min_matches == 0
            || cls.loiter_min_matches > cls.loiter_window
            || cls.loiter_window > cls.loiter_min_frames
        {
            return Err(anyhow!(
                "loitering requires 1 <= loiter_min_matches <= loiter_window <= loiter_min_frames"
            ));
        }
        if self.tracker.frame_buffer_size < cls.loiter_min_frames {
            return Err(anyhow!(
                "frame_buffer_size ({}) must hold at least loiter_min_frames ({})",
                self.tracker.frame_buffer_size,
                cls.loiter_min_frames
            ));
        }
        if self.tracker.history_size == 0 {
            return Err(anyhow!("history_size must be greater than zero"));
        }

        if self.alerts.max_retries == 0 {
            return Err(anyhow!("max_retries must be at least 1"));
        }
        if self.alerts.location.trim().is_empty() {
            return Err(anyhow!("alert location must not be empty"));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.frame_skip == 0 {
            return Err(anyhow!("frame_skip must be at least 1"));
        }
        if self.source.stats_interval < Duration::from_secs(MIN_STATS_INTERVAL_SECS) {
            return Err(anyhow!(
                "stats_interval must be at least {} seconds",
                MIN_STATS_INTERVAL_SECS
            ));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<SafezoneConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
