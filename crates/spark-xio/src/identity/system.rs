//! 各平台的具体查询策略，以及从命令输出或文件内容中提取字段的解析函数。

use std::{
    fs,
    path::PathBuf,
    process::{Command, Stdio},
    sync::OnceLock,
};

use serde::Deserialize;
use tracing::trace;

use super::{
    LookupChain, OsVersion,
    lookup::{HostLookup, memoized},
};

/// 运行外部命令并取标准输出；命令不存在或退出码非零都视为失败。
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .inspect_err(|err| trace!(program, %err, "host command unavailable"))
        .ok()?;
    if !output.status.success() {
        trace!(program, status = %output.status, "host command failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// 取字符串开头的十进制数字。
fn leading_number(text: &str) -> Option<u32> {
    let end = text
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// 解析 `major.minor[.rest]` 形式的版本号。
pub(crate) fn parse_dotted_version(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.trim().split('.');
    let major = leading_number(parts.next()?)?;
    let minor = parts.next().and_then(leading_number).unwrap_or(0);
    Some((major, minor))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimOperatingSystem {
    #[serde(rename = "OperatingSystemSKU")]
    operating_system_sku: u32,
    version: String,
}

/// 解析 `Get-CimInstance Win32_OperatingSystem | ConvertTo-Json` 的输出。
pub(crate) fn parse_cim_json(text: &str) -> Option<OsVersion> {
    let os: CimOperatingSystem = serde_json::from_str(text.trim())
        .inspect_err(|err| trace!(%err, "unexpected CIM document"))
        .ok()?;
    let (major, minor) = parse_dotted_version(&os.version)?;
    Some(OsVersion::windows(os.operating_system_sku, major, minor))
}

/// 解析 `ver` 的输出，如 `Microsoft Windows [Version 10.0.19045.3930]`。
///
/// 方括号内最后一个词即版本号，本地化系统上的 "Version" 字样不参与匹配。
pub(crate) fn parse_ver_output(text: &str) -> Option<OsVersion> {
    let start = text.find('[')? + 1;
    let end = start + text[start..].find(']')?;
    let (major, minor) = parse_dotted_version(text[start..end].split_whitespace().last()?)?;
    Some(OsVersion {
        tag: super::ProductTag::WindowsNt,
        major,
        minor,
    })
}

/// 从 `reg query <key> /v <value>` 的输出中取出值数据。
pub(crate) fn parse_reg_query_output(text: &str, value: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let name = fields.next()?;
        let kind = fields.next()?;
        if !name.eq_ignore_ascii_case(value) || !kind.starts_with("REG_") {
            return None;
        }
        let data = fields.collect::<Vec<_>>().join(" ");
        (!data.is_empty()).then_some(data)
    })
}

/// 从 `ioreg -rd1 -c IOPlatformExpertDevice` 的输出中取出 `IOPlatformUUID`。
pub(crate) fn parse_ioreg_uuid(text: &str) -> Option<String> {
    text.lines()
        .find(|line| line.contains("\"IOPlatformUUID\""))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.trim().trim_matches('"').to_owned())
        .filter(|uuid| !uuid.is_empty())
}

/// 解析 `uname -s -r` 的输出，如 `Darwin 23.1.0`。
pub(crate) fn parse_uname(text: &str) -> Option<OsVersion> {
    let mut fields = text.split_whitespace();
    let kernel = fields.next()?;
    let (major, minor) = parse_dotted_version(fields.next()?)?;
    Some(OsVersion::kernel(kernel, major, minor))
}

/// Windows：通过 PowerShell 的 CIM 查询拿产品类型与版本。
#[derive(Clone, Copy, Debug, Default)]
pub struct CimOperatingSystemLookup;

impl HostLookup<OsVersion> for CimOperatingSystemLookup {
    fn name(&self) -> &str {
        "cim-operating-system"
    }

    fn lookup(&self) -> Option<OsVersion> {
        let text = command_stdout(
            "powershell",
            &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-CimInstance Win32_OperatingSystem | Select-Object OperatingSystemSKU,Version | ConvertTo-Json -Compress",
            ],
        )?;
        parse_cim_json(&text)
    }
}

/// Windows：旧式 `ver` 命令，只能得到 `Windows NT` 标签。
#[derive(Clone, Copy, Debug, Default)]
pub struct VerCommandLookup;

impl HostLookup<OsVersion> for VerCommandLookup {
    fn name(&self) -> &str {
        "ver-command"
    }

    fn lookup(&self) -> Option<OsVersion> {
        parse_ver_output(&command_stdout("cmd", &["/C", "ver"])?)
    }
}

/// Linux：读取 `/proc/sys/kernel/{ostype,osrelease}`。
#[derive(Clone, Debug)]
pub struct KernelReleaseLookup {
    ostype: PathBuf,
    osrelease: PathBuf,
}

impl KernelReleaseLookup {
    pub fn new(ostype: impl Into<PathBuf>, osrelease: impl Into<PathBuf>) -> Self {
        Self {
            ostype: ostype.into(),
            osrelease: osrelease.into(),
        }
    }
}

impl Default for KernelReleaseLookup {
    fn default() -> Self {
        Self::new("/proc/sys/kernel/ostype", "/proc/sys/kernel/osrelease")
    }
}

impl HostLookup<OsVersion> for KernelReleaseLookup {
    fn name(&self) -> &str {
        "proc-kernel-release"
    }

    fn lookup(&self) -> Option<OsVersion> {
        let ostype = fs::read_to_string(&self.ostype).ok()?;
        let release = fs::read_to_string(&self.osrelease).ok()?;
        let kernel = ostype.trim();
        if kernel.is_empty() {
            return None;
        }
        let (major, minor) = parse_dotted_version(&release)?;
        Some(OsVersion::kernel(kernel, major, minor))
    }
}

/// Unix：`uname -s -r`。
#[derive(Clone, Copy, Debug, Default)]
pub struct UnameLookup;

impl HostLookup<OsVersion> for UnameLookup {
    fn name(&self) -> &str {
        "uname"
    }

    fn lookup(&self) -> Option<OsVersion> {
        parse_uname(&command_stdout("uname", &["-s", "-r"])?)
    }
}

/// 注册表视图：默认视图或强制 64 位视图。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryView {
    Default,
    Force64,
}

/// Windows：经 `reg query` 读取注册表值。
#[derive(Clone, Debug)]
pub struct RegistryValueLookup {
    key: String,
    value: String,
    view: RegistryView,
}

impl RegistryValueLookup {
    pub fn new(key: impl Into<String>, value: impl Into<String>, view: RegistryView) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            view,
        }
    }

    /// 遥测客户端的机器 ID：`HKLM\Software\Microsoft\SQMClient\MachineId`。
    pub fn machine_id(view: RegistryView) -> Self {
        Self::new(r"HKLM\Software\Microsoft\SQMClient", "MachineId", view)
    }
}

impl HostLookup<String> for RegistryValueLookup {
    fn name(&self) -> &str {
        match self.view {
            RegistryView::Default => "registry",
            RegistryView::Force64 => "registry-64",
        }
    }

    fn lookup(&self) -> Option<String> {
        let mut args = vec!["query", self.key.as_str(), "/v", self.value.as_str()];
        if self.view == RegistryView::Force64 {
            args.push("/reg:64");
        }
        parse_reg_query_output(&command_stdout("reg", &args)?, &self.value)
    }
}

/// 读取整个文件作为取值，如 `/etc/machine-id`。
#[derive(Clone, Debug)]
pub struct FileLookup {
    path: PathBuf,
}

impl FileLookup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostLookup<String> for FileLookup {
    fn name(&self) -> &str {
        "file"
    }

    fn lookup(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }
}

/// macOS：`ioreg` 中的 `IOPlatformUUID`。
#[derive(Clone, Copy, Debug, Default)]
pub struct IoregPlatformUuidLookup;

impl HostLookup<String> for IoregPlatformUuidLookup {
    fn name(&self) -> &str {
        "ioreg-platform-uuid"
    }

    fn lookup(&self) -> Option<String> {
        parse_ioreg_uuid(&command_stdout(
            "ioreg",
            &["-rd1", "-c", "IOPlatformExpertDevice"],
        )?)
    }
}

/// 需要启动外部进程的策略经 [`memoized`] 包装，每个进程只执行一次。
pub(crate) fn version_chain() -> LookupChain<OsVersion> {
    static CIM: OnceLock<Option<OsVersion>> = OnceLock::new();
    static VER: OnceLock<Option<OsVersion>> = OnceLock::new();
    static UNAME: OnceLock<Option<OsVersion>> = OnceLock::new();

    let chain = LookupChain::new();
    if cfg!(windows) {
        chain
            .then(memoized(&CIM, CimOperatingSystemLookup))
            .then(memoized(&VER, VerCommandLookup))
    } else if cfg!(target_os = "linux") {
        chain
            .then(KernelReleaseLookup::default())
            .then(memoized(&UNAME, UnameLookup))
    } else if cfg!(unix) {
        chain.then(memoized(&UNAME, UnameLookup))
    } else {
        chain
    }
}

pub(crate) fn device_id_chain() -> LookupChain<String> {
    static REGISTRY_DEFAULT: OnceLock<Option<String>> = OnceLock::new();
    static REGISTRY_64: OnceLock<Option<String>> = OnceLock::new();
    static IOREG: OnceLock<Option<String>> = OnceLock::new();

    let chain = LookupChain::new();
    if cfg!(windows) {
        chain
            .then(memoized(
                &REGISTRY_DEFAULT,
                RegistryValueLookup::machine_id(RegistryView::Default),
            ))
            .then(memoized(
                &REGISTRY_64,
                RegistryValueLookup::machine_id(RegistryView::Force64),
            ))
    } else if cfg!(target_os = "macos") {
        chain.then(memoized(&IOREG, IoregPlatformUuidLookup))
    } else if cfg!(unix) {
        chain
            .then(FileLookup::new("/etc/machine-id"))
            .then(FileLookup::new("/var/lib/dbus/machine-id"))
    } else {
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ProductTag;

    #[test]
    fn cim_document_yields_product_and_version() {
        let version = parse_cim_json(r#"{"OperatingSystemSKU":48,"Version":"10.0.19045"}"#)
            .expect("valid CIM document");
        assert_eq!(version, OsVersion::windows(48, 10, 0));
        assert_eq!(parse_cim_json("not json"), None);
    }

    #[test]
    fn ver_output_is_parsed_inside_brackets() {
        let version = parse_ver_output("\r\nMicrosoft Windows [Version 6.3.9600]\r\n")
            .expect("bracketed version");
        assert_eq!(version.tag, ProductTag::WindowsNt);
        assert_eq!((version.major, version.minor), (6, 3));
        assert_eq!(parse_ver_output("Microsoft Windows"), None);
    }

    #[test]
    fn reg_query_value_is_extracted() {
        let output = "\r\nHKEY_LOCAL_MACHINE\\Software\\Microsoft\\SQMClient\r\n    MachineId    REG_SZ    {3F2504E0-4F89-11D3-9A0C-0305E82C3301}\r\n\r\n";
        assert_eq!(
            parse_reg_query_output(output, "MachineId").as_deref(),
            Some("{3F2504E0-4F89-11D3-9A0C-0305E82C3301}")
        );
        assert_eq!(parse_reg_query_output(output, "Other"), None);
    }

    #[test]
    fn ioreg_uuid_is_extracted() {
        let output = r#"  |   "IOPlatformSerialNumber" = "C02XYZ"
    "IOPlatformUUID" = "564D2E6A-1C1F-4B7D-8E22-0E4F1A7A9B10"
"#;
        assert_eq!(
            parse_ioreg_uuid(output).as_deref(),
            Some("564D2E6A-1C1F-4B7D-8E22-0E4F1A7A9B10")
        );
    }

    #[test]
    fn release_strings_tolerate_suffixes() {
        assert_eq!(parse_dotted_version("6.1.0-13-amd64\n"), Some((6, 1)));
        assert_eq!(parse_dotted_version("6.8-rc1"), Some((6, 8)));
        assert_eq!(parse_dotted_version("10"), Some((10, 0)));
        assert_eq!(parse_dotted_version("rc"), None);
        assert_eq!(
            parse_uname("Darwin 23.1.0\n"),
            Some(OsVersion::kernel("Darwin", 23, 1))
        );
    }

    #[test]
    fn kernel_release_reads_proc_style_files() {
        let dir = std::env::temp_dir().join(format!("spark-xio-kernel-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        fs::write(dir.join("ostype"), "Linux\n").expect("write ostype");
        fs::write(dir.join("osrelease"), "5.15.0-91-generic\n").expect("write osrelease");

        let lookup = KernelReleaseLookup::new(dir.join("ostype"), dir.join("osrelease"));
        assert_eq!(lookup.lookup(), Some(OsVersion::kernel("Linux", 5, 15)));

        let missing = KernelReleaseLookup::new(dir.join("absent"), dir.join("osrelease"));
        assert_eq!(missing.lookup(), None);
        let _ = fs::remove_dir_all(&dir);
    }
}
