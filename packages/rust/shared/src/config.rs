//! Application configuration for Tenderflow.
//!
//! User config lives at `~/.tenderflow/tenderflow.toml`.
//! An explicit `--config` path overrides the default location; missing
//! files fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TenderflowError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderflow";

/// Buyer profile handed to the relevance oracle.
pub const DEFAULT_COMPANY_PROFILE: &str = r#"
You are analyzing tenders for a specialized technology company with the following capabilities:

CORE EXPERTISE:
- Data Analytics & Big Data Solutions
- AI/ML Systems & Agentic AI
- Fintech & Banking Technology
- Payment Systems (UPI, CBDC, BBPS, IMPS, Merchant Acquiring)
- Fraud Risk Monitoring & Early Warning Systems
- Online Dispute Resolution (ODR) platforms
- Digital Banking Infrastructure
- Hardware Security Modules (HSM) & Cryptographic Solutions
- Key Management Systems (KMS)
- Omnichannel Banking Solutions
- Loan Management Systems
- Load Balancers & Network Infrastructure
- Cybersecurity Solutions & Security Auditing
- IT Risk Assessment & Vendor Risk Management
- Compliance & Due Diligence Auditing (including CERT-In standards)
- Information Security Management
- Penetration Testing & Vulnerability Assessment

RELEVANT TENDERS (accept these):
- Software development for banking/fintech
- IT infrastructure & security solutions
- Cybersecurity auditing & risk assessment services
- CERT-In certified security audits
- Vendor risk management & due diligence
- Payment gateway/processing systems
- Digital transformation projects
- Cloud infrastructure & data centers
- AI/ML implementation projects
- Financial technology platforms

IRRELEVANT TENDERS (reject these):
- Civil construction, interior furnishing, furniture
- Electrical works, HVAC, plumbing
- Building materials, maintenance
- Non-technology services
- Physical infrastructure without IT component
"#;

// ---------------------------------------------------------------------------
// Config structs (matching tenderflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output directory layout.
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Relevance filter settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Classification oracle (Gemini) settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Embedding oracle settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// `[processing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Roots the collector deposits tender folders into.
    #[serde(default = "default_input_folders")]
    pub input_folders: Vec<PathBuf>,

    /// Output roots for each stage.
    #[serde(default)]
    pub output_folders: OutputFolders,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            input_folders: default_input_folders(),
            output_folders: OutputFolders::default(),
        }
    }
}

fn default_input_folders() -> Vec<PathBuf> {
    vec![PathBuf::from("data/downloads")]
}

/// `[processing.output_folders]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFolders {
    /// Filtered documents, one folder per accepted tender.
    #[serde(default = "default_filtered_dir")]
    pub filtered: PathBuf,
    /// Extracted forms, one folder per accepted tender.
    #[serde(default = "default_extracted_dir")]
    pub extracted: PathBuf,
    /// Converted documents, mirroring `extracted`.
    #[serde(default = "default_docx_dir")]
    pub docx: PathBuf,
    /// Flat directory of per-document metadata files.
    #[serde(default = "default_metadata_dir")]
    pub metadata: PathBuf,
}

impl Default for OutputFolders {
    fn default() -> Self {
        Self {
            filtered: default_filtered_dir(),
            extracted: default_extracted_dir(),
            docx: default_docx_dir(),
            metadata: default_metadata_dir(),
        }
    }
}

impl OutputFolders {
    /// All output roots, in stage order.
    pub fn all(&self) -> [&Path; 4] {
        [&self.filtered, &self.extracted, &self.docx, &self.metadata]
    }

    /// Create every output root that does not exist yet.
    pub fn ensure_exist(&self) -> Result<()> {
        for dir in self.all() {
            std::fs::create_dir_all(dir).map_err(|e| TenderflowError::io(dir, e))?;
        }
        Ok(())
    }
}

fn default_filtered_dir() -> PathBuf {
    PathBuf::from("data/filtered")
}
fn default_extracted_dir() -> PathBuf {
    PathBuf::from("data/extracted_sections")
}
fn default_docx_dir() -> PathBuf {
    PathBuf::from("data/output_docx")
}
fn default_metadata_dir() -> PathBuf {
    PathBuf::from("data/metadata")
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Decision cache file.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Leading pages sampled for relevance.
    #[serde(default = "default_max_pages")]
    pub max_pages_to_scan: u32,

    /// Characters of sampled text embedded for the semantic score.
    #[serde(default = "default_semantic_sample_chars")]
    pub semantic_sample_chars: usize,

    /// Characters of sampled text sent to the relevance oracle.
    #[serde(default = "default_relevance_window_chars")]
    pub relevance_window_chars: usize,

    /// Minimum seconds between two relevance oracle calls.
    #[serde(default = "default_min_call_interval")]
    pub min_call_interval_secs: f64,

    /// Capability phrases the semantic scorer compares against.
    #[serde(default = "default_capability_descriptors")]
    pub capability_descriptors: Vec<String>,

    /// Buyer profile prepended to every relevance prompt.
    #[serde(default = "default_company_profile")]
    pub company_profile: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            max_pages_to_scan: default_max_pages(),
            semantic_sample_chars: default_semantic_sample_chars(),
            relevance_window_chars: default_relevance_window_chars(),
            min_call_interval_secs: default_min_call_interval(),
            capability_descriptors: default_capability_descriptors(),
            company_profile: default_company_profile(),
        }
    }
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("data/filter_cache.json")
}
fn default_max_pages() -> u32 {
    5
}
fn default_semantic_sample_chars() -> usize {
    3_000
}
fn default_relevance_window_chars() -> usize {
    6_000
}
fn default_min_call_interval() -> f64 {
    6.0
}
fn default_capability_descriptors() -> Vec<String> {
    [
        "data analytics and artificial intelligence",
        "machine learning and AI systems",
        "fintech and digital payments",
        "banking technology and core banking",
        "fraud detection and risk monitoring",
        "payment gateway and UPI systems",
        "blockchain and digital currency",
        "cybersecurity and encryption",
        "loan management systems",
        "merchant acquiring platforms",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_company_profile() -> String {
    DEFAULT_COMPANY_PROFILE.into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Generative model used for every classification call.
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API root.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,

    /// Delay between upload state polls.
    #[serde(default = "default_poll_interval")]
    pub upload_poll_interval_ms: u64,

    /// Polls before an upload stuck in processing is abandoned.
    #[serde(default = "default_poll_attempts")]
    pub upload_poll_max_attempts: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout(),
            upload_poll_interval_ms: default_poll_interval(),
            upload_poll_max_attempts: default_poll_attempts(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_gemini_timeout() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    2_000
}
fn default_poll_attempts() -> u32 {
    150
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Ollama-compatible embedding server.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Per-request timeout.
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_embedding_model() -> String {
    "all-minilm".into()
}
fn default_embedding_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderflow/tenderflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderflowError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        TenderflowError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot start with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (section, raw) in [
        ("gemini", &config.gemini.base_url),
        ("embedding", &config.embedding.base_url),
    ] {
        Url::parse(raw).map_err(|e| {
            TenderflowError::config(format!("[{section}] base_url '{raw}' is invalid: {e}"))
        })?;
    }

    if config.filter.capability_descriptors.is_empty() {
        return Err(TenderflowError::config(
            "[filter] capability_descriptors must not be empty",
        ));
    }
    if config.filter.max_pages_to_scan == 0 {
        return Err(TenderflowError::config(
            "[filter] max_pages_to_scan must be at least 1",
        ));
    }
    if !config.filter.min_call_interval_secs.is_finite()
        || config.filter.min_call_interval_secs < 0.0
    {
        return Err(TenderflowError::config(
            "[filter] min_call_interval_secs must be a non-negative number",
        ));
    }
    Ok(())
}

/// Check that the Gemini API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TenderflowError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable."
        ))),
    }
}
