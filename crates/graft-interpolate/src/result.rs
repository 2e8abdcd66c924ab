//! Analysis output: one result per call site, grouped into one generated
//! unit per (source file, originating assembly) pair.

use crate::analyzer::CallSite;
use crate::fragment::Fragment;
use graft_core::diagnostics::Diagnostic;
use graft_core::span::{stable_hash, Span};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub file: PathBuf,
    pub assembly: String,
    pub span: Span,
    pub method_name: String,
    /// False when the unsupported sentinel appeared anywhere: diagnostics
    /// are surfaced but no code is generated for this site.
    pub supported: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub method: Option<Fragment>,
    pub factories: Vec<Fragment>,
}

impl AnalysisResult {
    pub(crate) fn failed(
        site: &CallSite,
        method_name: String,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            file: site.file.clone(),
            assembly: site.assembly.clone(),
            span: site.span,
            method_name,
            supported: false,
            diagnostics,
            method: None,
            factories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisGroup {
    pub file: PathBuf,
    pub assembly: String,
    pub unit_name: String,
    pub results: Vec<AnalysisResult>,
}

impl AnalysisGroup {
    /// Group results by (file, assembly), preserving first-seen order so
    /// output is deterministic for deterministic input.
    pub fn group(results: Vec<AnalysisResult>) -> Vec<AnalysisGroup> {
        let mut groups: Vec<AnalysisGroup> = Vec::new();
        for result in results {
            match groups
                .iter_mut()
                .find(|g| g.file == result.file && g.assembly == result.assembly)
            {
                Some(group) => group.results.push(result),
                None => {
                    let unit_name = format!(
                        "graft_generated_{:08x}",
                        stable_hash(&(
                            result.assembly.clone(),
                            result.file.to_string_lossy().to_string()
                        )) as u32
                    );
                    groups.push(AnalysisGroup {
                        file: result.file.clone(),
                        assembly: result.assembly.clone(),
                        unit_name,
                        results: vec![result],
                    });
                }
            }
        }
        groups
    }

    /// Render the generated unit: every supported site's interceptor plus
    /// the auxiliary witness factories it needed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "// {} generated from {} ({})\n",
            self.unit_name,
            self.file.display(),
            self.assembly
        ));
        out.push_str("#![allow(nonstandard_style)]\n\n");
        for result in &self.results {
            let Some(method) = &result.method else {
                continue;
            };
            for factory in &result.factories {
                out.push_str(&factory.render());
                out.push_str("\n\n");
            }
            out.push_str(&method.render());
            out.push_str("\n\n");
        }
        out
    }

    pub fn supported_count(&self) -> usize {
        self.results.iter().filter(|r| r.supported).count()
    }
}
