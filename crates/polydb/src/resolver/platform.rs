//! Plugin module naming.
//!
//! A driver module is looked up under several names, most specific first:
//!
//! 1. `{name}.{os}-{arch}` (e.g. `Npgsql.linux-x64`)
//! 2. `{name}.{os}`
//! 3. `{name}_net{major}{minor}` for the current runtime and every older
//!    compatible one, newest first
//! 4. `{name}_netstandard21`, `{name}_netstandard20`
//! 5. `{name}`

/// Runtime versions a module may target, newest first.
const RUNTIMES: &[(u32, u32)] = &[(9, 0), (8, 0), (7, 0), (6, 0), (5, 0)];

/// Host description used to build candidate module names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `win`, `linux` or `osx`.
    pub os: String,
    /// `x86`, `x64`, `arm` or `arm64`.
    pub arch: String,
    /// Runtime version the host was built for.
    pub runtime: (u32, u32),
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, runtime: (u32, u32)) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            runtime,
        }
    }

    /// The platform this process runs on.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "windows" => "win",
            "macos" | "ios" => "osx",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "x86" => "x86",
            "arm" => "arm",
            other => other,
        };
        Self::new(os, arch, (8, 0))
    }

    /// Candidate module names for `name`, in lookup order.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let mut names = vec![
            format!("{}.{}-{}", name, self.os, self.arch),
            format!("{}.{}", name, self.os),
        ];
        let mut runtimes: Vec<(u32, u32)> = RUNTIMES
            .iter()
            .copied()
            .filter(|v| *v <= self.runtime)
            .collect();
        if !runtimes.contains(&self.runtime) {
            runtimes.insert(0, self.runtime);
        }
        names.extend(
            runtimes
                .into_iter()
                .map(|(major, minor)| format!("{}_net{}{}", name, major, minor)),
        );
        names.push(format!("{}_netstandard21", name));
        names.push(format!("{}_netstandard20", name));
        names.push(name.to_string());
        names
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}
