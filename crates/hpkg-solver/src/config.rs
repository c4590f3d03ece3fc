//! Solver configuration (`hpkg.toml`).
//!
//! ```toml
//! [arch]
//! platform = "linux"
//! os = "rhel8"
//! target = "x86_64"
//!
//! [[compilers]]
//! spec = "gcc@=12.2.0"
//! operating-system = "rhel8"
//! [compilers.flags]
//! cflags = "-O2"
//!
//! [packages.all]
//! compiler = ["gcc", "clang"]
//! providers = { mpi = ["openmpi", "mpich"] }
//!
//! [packages.zlib]
//! version = ["1.2.13"]
//! variants = "~shared"
//! buildable = false
//! [[packages.zlib.externals]]
//! spec = "zlib@1.2.11"
//! prefix = "/usr"
//!
//! [solver]
//! max-steps = 100000
//! timeout-ms = 30000
//! version-policy = "config-first"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hpkg_spec::{parse_node, ArchSpec, CompilerSpec, FlagMap, SpecHash, SpecNode, VariantValue};
use hpkg_version::{Version, VersionList};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{VersionPolicy, DEFAULT_VERSION_POLICY};

/// Package key whose preferences apply to every package.
pub const ALL_PACKAGES: &str = "all";

const DEFAULT_MAX_STEPS: usize = 200_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    arch: RawArch,
    #[serde(default)]
    compilers: Vec<RawCompiler>,
    #[serde(default)]
    packages: BTreeMap<String, RawPackagePrefs>,
    #[serde(default)]
    solver: RawSolver,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArch {
    platform: Option<String>,
    os: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawCompiler {
    spec: String,
    platform: Option<String>,
    operating_system: Option<String>,
    target: Option<String>,
    #[serde(default)]
    flags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawPackagePrefs {
    #[serde(default)]
    version: Vec<String>,
    variants: Option<String>,
    #[serde(default)]
    compiler: Vec<String>,
    #[serde(default)]
    providers: BTreeMap<String, Vec<String>>,
    buildable: Option<bool>,
    #[serde(default)]
    externals: Vec<RawExternal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExternal {
    spec: String,
    prefix: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawSolver {
    max_steps: Option<usize>,
    timeout_ms: Option<u64>,
    version_policy: Option<VersionPolicy>,
}

/// A compiler the solver may assign, with where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerEntry {
    pub spec: CompilerSpec,
    /// Architectures the compiler is available on; empty fields match
    /// anything.
    pub arch: ArchSpec,
    /// Flags added to every node built with this compiler.
    pub flags: FlagMap,
}

/// A pre-installed package the solver may use instead of building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct External {
    /// Named node with a single version; its `external` field holds the
    /// prefix.
    pub spec: SpecNode,
}

impl External {
    pub fn prefix(&self) -> Option<&Path> {
        self.spec.external.as_deref()
    }
}

/// Preferences for one package, or for all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePrefs {
    /// Ordered; earlier entries win.
    pub versions: Vec<VersionList>,
    /// Anonymous node carrying preferred variant values.
    pub variants: SpecNode,
    /// Ordered compiler preferences.
    pub compilers: Vec<CompilerSpec>,
    /// Virtual name to ordered provider names.
    pub providers: BTreeMap<String, Vec<String>>,
    pub buildable: Option<bool>,
    pub externals: Vec<External>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverSettings {
    pub max_steps: usize,
    pub timeout: Option<Duration>,
    pub version_policy: VersionPolicy,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_steps: DEFAULT_MAX_STEPS,
            timeout: None,
            version_policy: DEFAULT_VERSION_POLICY,
        }
    }
}

/// Validated solver configuration. Read-only while a solve runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Architecture given to root specs. Always fully determined.
    pub arch: ArchSpec,
    /// Compilers in priority order. When empty, nodes get no compiler.
    pub compilers: Vec<CompilerEntry>,
    pub packages: BTreeMap<String, PackagePrefs>,
    pub solver: SolverSettings,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            arch: ArchSpec::host(),
            compilers: Vec::new(),
            packages: BTreeMap::new(),
            solver: SolverSettings::default(),
        }
    }
}

impl SolverConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        Self::validate(raw)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: PathBuf::from("<string>"),
            source,
        })?;
        Self::validate(raw)
    }

    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.solver.version_policy = policy;
        self
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();

        let host = ArchSpec::host();
        let arch = ArchSpec {
            platform: raw.arch.platform.or(host.platform),
            os: raw.arch.os.or(host.os),
            target: raw.arch.target.or(host.target),
        };

        let mut compilers = Vec::new();
        let mut seen = HashSet::new();
        for entry in raw.compilers {
            let spec = match CompilerSpec::parse(&entry.spec) {
                Ok(spec) => spec,
                Err(e) => {
                    problems.push(format!("compiler '{}': {e}", entry.spec));
                    continue;
                }
            };
            if !spec.is_concrete() {
                problems.push(format!("compiler '{}' must name a single version", entry.spec));
                continue;
            }
            let arch = ArchSpec {
                platform: entry.platform,
                os: entry.operating_system,
                target: entry.target,
            };
            if !seen.insert((spec.to_string(), arch.clone())) {
                problems.push(format!("duplicate compiler entry '{spec}'"));
                continue;
            }
            let mut flags = FlagMap::new();
            for (category, value) in &entry.flags {
                if let Err(e) = flags.add(category, value) {
                    problems.push(format!("compiler '{spec}': {e}"));
                }
            }
            compilers.push(CompilerEntry { spec, arch, flags });
        }

        let mut packages = BTreeMap::new();
        for (name, prefs) in raw.packages {
            packages.insert(name.clone(), validate_package(&name, prefs, &mut problems));
        }

        let solver = SolverSettings {
            max_steps: raw.solver.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            timeout: raw.solver.timeout_ms.map(Duration::from_millis),
            version_policy: raw.solver.version_policy.unwrap_or(DEFAULT_VERSION_POLICY),
        };
        if solver.max_steps == 0 {
            problems.push("solver.max-steps must be positive".to_string());
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid { problems });
        }
        Ok(SolverConfig {
            arch,
            compilers,
            packages,
            solver,
        })
    }

    fn prefs(&self, name: &str) -> Option<&PackagePrefs> {
        self.packages.get(name)
    }

    fn all(&self) -> Option<&PackagePrefs> {
        self.packages.get(ALL_PACKAGES)
    }

    /// Configured version preferences for `name`, most preferred first.
    pub fn version_preferences(&self, name: &str) -> &[VersionList] {
        self.prefs(name).map(|p| p.versions.as_slice()).unwrap_or_default()
    }

    /// Configured value for a variant: the package's own preference, then
    /// the one for all packages.
    pub fn variant_preference(&self, name: &str, variant: &str) -> Option<&VariantValue> {
        self.prefs(name)
            .and_then(|p| p.variants.variant(variant))
            .or_else(|| self.all().and_then(|p| p.variants.variant(variant)))
    }

    pub fn compiler_preferences(&self, name: &str) -> &[CompilerSpec] {
        match self.prefs(name) {
            Some(p) if !p.compilers.is_empty() => &p.compilers,
            _ => self.all().map(|p| p.compilers.as_slice()).unwrap_or_default(),
        }
    }

    /// Preferred providers of a virtual, from `[packages.all]`.
    pub fn provider_preferences(&self, virtual_name: &str) -> &[String] {
        self.all()
            .and_then(|p| p.providers.get(virtual_name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn buildable(&self, name: &str) -> bool {
        self.prefs(name)
            .and_then(|p| p.buildable)
            .or_else(|| self.all().and_then(|p| p.buildable))
            .unwrap_or(true)
    }

    pub fn externals(&self, name: &str) -> &[External] {
        self.prefs(name).map(|p| p.externals.as_slice()).unwrap_or_default()
    }

    /// Whether solved nodes must carry a compiler.
    pub fn require_compiler(&self) -> bool {
        !self.compilers.is_empty()
    }

    /// Hash of every setting; part of the key for cached solves.
    pub fn fingerprint(&self) -> SpecHash {
        SpecHash::compute(format!("{self:?}").as_bytes())
    }
}

fn validate_package(name: &str, raw: RawPackagePrefs, problems: &mut Vec<String>) -> PackagePrefs {
    let mut prefs = PackagePrefs {
        buildable: raw.buildable,
        providers: raw.providers,
        ..Default::default()
    };

    for text in &raw.version {
        match VersionList::parse(text) {
            Ok(list) => prefs.versions.push(list),
            Err(e) => problems.push(format!("packages.{name}.version: {e}")),
        }
    }

    if let Some(text) = &raw.variants {
        match parse_node(text) {
            Ok(node) if node.is_anonymous() => prefs.variants = node,
            Ok(_) => problems.push(format!("packages.{name}.variants '{text}' must not name a package")),
            Err(e) => problems.push(format!("packages.{name}.variants: {e}")),
        }
    }

    for text in &raw.compiler {
        match CompilerSpec::parse(text) {
            Ok(spec) => prefs.compilers.push(spec),
            Err(e) => problems.push(format!("packages.{name}.compiler: {e}")),
        }
    }

    if name == ALL_PACKAGES && !raw.externals.is_empty() {
        problems.push("packages.all cannot declare externals".to_string());
        return prefs;
    }
    for external in raw.externals {
        match validate_external(name, &external) {
            Ok(spec) => prefs.externals.push(External { spec }),
            Err(detail) => problems.push(format!("packages.{name}.externals '{}': {detail}", external.spec)),
        }
    }
    prefs
}

fn validate_external(name: &str, raw: &RawExternal) -> Result<SpecNode, String> {
    let mut node = parse_node(&raw.spec).map_err(|e| e.to_string())?;
    if node.name != name {
        return Err(format!("must describe package '{name}'"));
    }
    if node.version().is_none() {
        // `zlib@1.2.11` names one release even though it parses as a range.
        let pinned = Version::parse(&node.versions.to_string()).map_err(|_| "needs a single version".to_string())?;
        node.versions = VersionList::exact(pinned);
    }
    node.external = Some(raw.prefix.clone());
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[arch]
platform = "linux"
os = "rhel8"
target = "x86_64"

[[compilers]]
spec = "gcc@=12.2.0"
[compilers.flags]
cflags = "-O2 -g"

[[compilers]]
spec = "clang@=16.0.0"
target = "aarch64"

[packages.all]
compiler = ["clang", "gcc"]
providers = { mpi = ["openmpi", "mpich"] }
variants = "+shared"

[packages.zlib]
version = ["1.2.13", "1.3:"]
variants = "~shared"
buildable = false

[[packages.zlib.externals]]
spec = "zlib@1.2.11"
prefix = "/usr"

[solver]
max-steps = 500
timeout-ms = 2000
version-policy = "package-first"
"#;

    #[test]
    fn parses_full_config() {
        let config = SolverConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.arch, ArchSpec::new("linux", "rhel8", "x86_64"));
        assert_eq!(config.compilers.len(), 2);
        assert_eq!(config.compilers[0].flags.get("cflags"), ["-O2", "-g"]);
        assert_eq!(config.compilers[1].arch.target.as_deref(), Some("aarch64"));
        assert_eq!(config.solver.max_steps, 500);
        assert_eq!(config.solver.timeout, Some(Duration::from_millis(2000)));
        assert_eq!(config.solver.version_policy, VersionPolicy::PackageFirst);
        assert!(config.require_compiler());
    }

    #[test]
    fn package_lookups_fall_back_to_all() {
        let config = SolverConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.version_preferences("zlib").len(), 2);
        assert!(config.version_preferences("hdf5").is_empty());
        assert_eq!(config.variant_preference("zlib", "shared"), Some(&VariantValue::Bool(false)));
        assert_eq!(config.variant_preference("hdf5", "shared"), Some(&VariantValue::Bool(true)));
        assert_eq!(config.compiler_preferences("hdf5")[0].name, "clang");
        assert_eq!(config.provider_preferences("mpi"), ["openmpi", "mpich"]);
        assert!(!config.buildable("zlib"));
        assert!(config.buildable("hdf5"));
    }

    #[test]
    fn external_range_becomes_a_pinned_version() {
        let config = SolverConfig::from_toml_str(FULL).unwrap();
        let external = &config.externals("zlib")[0];
        assert_eq!(external.spec.version().unwrap().to_string(), "1.2.11");
        assert_eq!(external.prefix(), Some(Path::new("/usr")));
    }

    #[test]
    fn collects_every_problem() {
        let text = r#"
[[compilers]]
spec = "gcc@=12.2.0"

[[compilers]]
spec = "gcc@=12.2.0"

[[compilers]]
spec = "gcc@12:"

[packages.zlib]
version = ["1.2:1.0"]
variants = "zlib+shared"

[[packages.zlib.externals]]
spec = "zlib@1.2:1.3"
prefix = "/usr"
"#;
        let Err(ConfigError::Invalid { problems }) = SolverConfig::from_toml_str(text) else {
            panic!("expected invalid configuration");
        };
        assert_eq!(problems.len(), 5, "{problems:#?}");
        assert!(problems[0].contains("duplicate compiler"));
        assert!(problems[1].contains("single version"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            SolverConfig::from_toml_str("[solver]\nmax-step = 3\n"),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpkg.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = SolverConfig::load(&path).unwrap();
        assert_eq!(config.fingerprint(), SolverConfig::from_toml_str(FULL).unwrap().fingerprint());
        assert!(SolverConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
