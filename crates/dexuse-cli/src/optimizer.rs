//! Optimizer that shells out to a configured compiler command.

use std::process::{Command, Stdio};

use dexuse_manager::{DexOptResult, DexOptimizer, SecondaryDexOpt};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    command: Vec<String>,
}

impl CommandOptimizer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Program and arguments for `request`, or `None` when no command is set.
    pub fn command_line(&self, request: &SecondaryDexOpt<'_>) -> Option<Vec<String>> {
        if self.command.is_empty() {
            return None;
        }
        let mut args = self.command.clone();
        args.push("--dex-file".into());
        args.push(request.dex_path.to_string());
        for isa in request.isas {
            args.push("--isa".into());
            args.push(isa.clone());
        }
        args.push("--compiler-filter".into());
        args.push(request.compiler_filter.to_string());
        if request.used_by_other_apps {
            args.push("--shared".into());
        }
        if request.force {
            args.push("--force".into());
        }
        Some(args)
    }
}

impl DexOptimizer for CommandOptimizer {
    fn optimize_secondary(&self, request: &SecondaryDexOpt<'_>) -> DexOptResult {
        let Some(args) = self.command_line(request) else {
            debug!(path = request.dex_path, "No optimizer configured");
            return DexOptResult::Skipped;
        };
        let (program, rest) = args.split_at(1);

        match Command::new(&program[0])
            .args(rest)
            .stdin(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => DexOptResult::Performed,
            Ok(status) => {
                warn!(path = request.dex_path, %status, "Optimizer failed");
                DexOptResult::Failed
            }
            Err(e) => {
                warn!(program = %program[0], error = %e, "Could not run optimizer");
                DexOptResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexuse_index::PackageInfo;
    use std::collections::BTreeSet;

    fn with_request<R>(f: impl FnOnce(&SecondaryDexOpt<'_>) -> R) -> R {
        let app = PackageInfo::new("com.example.app", "/data/app/com.example.app/base.apk");
        let isas = BTreeSet::from(["arm".to_string(), "arm64".to_string()]);
        let request = SecondaryDexOpt {
            app: &app,
            dex_path: "/data/user/0/com.example.app/a.jar",
            isas: &isas,
            compiler_filter: "speed",
            used_by_other_apps: true,
            force: true,
        };
        f(&request)
    }

    #[test]
    fn test_command_line() {
        let opt = CommandOptimizer::new(vec!["dex2oat-wrapper".into(), "--quiet".into()]);
        let args = with_request(|r| opt.command_line(r)).unwrap();
        assert_eq!(
            args,
            vec![
                "dex2oat-wrapper",
                "--quiet",
                "--dex-file",
                "/data/user/0/com.example.app/a.jar",
                "--isa",
                "arm",
                "--isa",
                "arm64",
                "--compiler-filter",
                "speed",
                "--shared",
                "--force",
            ]
        );
    }

    #[test]
    fn test_unconfigured_is_skipped() {
        let opt = CommandOptimizer::new(Vec::new());
        assert_eq!(with_request(|r| opt.optimize_secondary(r)), DexOptResult::Skipped);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_maps_to_result() {
        let ok = CommandOptimizer::new(vec!["true".into()]);
        assert_eq!(with_request(|r| ok.optimize_secondary(r)), DexOptResult::Performed);

        let bad = CommandOptimizer::new(vec!["false".into()]);
        assert_eq!(with_request(|r| bad.optimize_secondary(r)), DexOptResult::Failed);

        let missing = CommandOptimizer::new(vec!["/nonexistent/dexopt".into()]);
        assert_eq!(with_request(|r| missing.optimize_secondary(r)), DexOptResult::Failed);
    }
}
