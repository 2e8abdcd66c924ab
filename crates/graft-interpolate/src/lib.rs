// graft-interpolate: the expression-interpolation engine
//
// Architecture:
// - fragment/builder/scope: the generated-code IR and its memoized factory
// - visit: the interpolated/evaluated walkers over a lambda body
// - desugar/subst: query lowering and identifier substitution, shared by
//   both pipelines
// - analyzer/result: source-pipeline orchestration and output assembly
// - runtime: the reflection-style pipeline rewriting built trees directly

pub mod analyzer;
pub mod builder;
pub mod capability;
pub mod desugar;
pub mod error;
pub mod fragment;
pub mod result;
pub mod runtime;
pub mod scope;
pub mod subst;
pub mod visit;

pub use analyzer::{CallSite, InterpolationAnalyzer};
pub use capability::{SpliceKind, Splicer};
pub use fragment::{Fragment, FragmentKind};
pub use result::{AnalysisGroup, AnalysisResult};
pub use runtime::{Interpolation, InterpolationOutcome};
