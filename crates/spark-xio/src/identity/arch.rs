use std::fmt;

/// 处理器架构，编码沿用 Windows `PROCESSOR_ARCHITECTURE_*` 数值。
///
/// 只有四个编码有专属标签，其余一律渲染为 `UNKNOWN`（包括 ARM64 = 12）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorArchitecture {
    Amd64,
    Arm,
    Ia64,
    Intel,
    Other(u16),
}

impl ProcessorArchitecture {
    pub const CODE_INTEL: u16 = 0;
    pub const CODE_ARM: u16 = 5;
    pub const CODE_IA64: u16 = 6;
    pub const CODE_AMD64: u16 = 9;
    pub const CODE_ARM64: u16 = 12;
    pub const CODE_UNKNOWN: u16 = 0xFFFF;

    /// 所有可能出现的标签。
    pub const LABELS: [&'static str; 5] = ["x64", "ARM", "IA64", "x32", "UNKNOWN"];

    pub const fn from_code(code: u16) -> Self {
        match code {
            Self::CODE_AMD64 => ProcessorArchitecture::Amd64,
            Self::CODE_ARM => ProcessorArchitecture::Arm,
            Self::CODE_IA64 => ProcessorArchitecture::Ia64,
            Self::CODE_INTEL => ProcessorArchitecture::Intel,
            other => ProcessorArchitecture::Other(other),
        }
    }

    pub const fn code(self) -> u16 {
        match self {
            ProcessorArchitecture::Amd64 => Self::CODE_AMD64,
            ProcessorArchitecture::Arm => Self::CODE_ARM,
            ProcessorArchitecture::Ia64 => Self::CODE_IA64,
            ProcessorArchitecture::Intel => Self::CODE_INTEL,
            ProcessorArchitecture::Other(code) => code,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ProcessorArchitecture::Amd64 => "x64",
            ProcessorArchitecture::Arm => "ARM",
            ProcessorArchitecture::Ia64 => "IA64",
            ProcessorArchitecture::Intel => "x32",
            ProcessorArchitecture::Other(_) => "UNKNOWN",
        }
    }

    /// 由 `std::env::consts::ARCH` 推导。
    pub fn from_target_arch(arch: &str) -> Self {
        match arch {
            "x86_64" => ProcessorArchitecture::Amd64,
            "x86" => ProcessorArchitecture::Intel,
            "arm" => ProcessorArchitecture::Arm,
            "aarch64" => ProcessorArchitecture::Other(Self::CODE_ARM64),
            _ => ProcessorArchitecture::Other(Self::CODE_UNKNOWN),
        }
    }

    /// 解析 Windows `PROCESSOR_ARCHITECTURE` 环境变量的取值。
    pub fn from_environment_name(name: &str) -> Option<Self> {
        let name = name.trim();
        [
            ("AMD64", Self::CODE_AMD64),
            ("x86", Self::CODE_INTEL),
            ("ARM", Self::CODE_ARM),
            ("IA64", Self::CODE_IA64),
            ("ARM64", Self::CODE_ARM64),
        ]
        .into_iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, code)| Self::from_code(code))
    }

    /// 探测当前主机。Windows 上优先读取 `PROCESSOR_ARCHITECTURE`，以便 32 位进程也报告宿主架构。
    pub fn detect() -> Self {
        if cfg!(windows)
            && let Some(arch) = std::env::var("PROCESSOR_ARCHITEW6432")
                .or_else(|_| std::env::var("PROCESSOR_ARCHITECTURE"))
                .ok()
                .as_deref()
                .and_then(Self::from_environment_name)
        {
            return arch;
        }
        Self::from_target_arch(std::env::consts::ARCH)
    }
}

impl fmt::Display for ProcessorArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
