//! Fragment program sources and keyword specialization.
//!
//! Every pass is a fragment program drawn over a full-screen quad. The vertex
//! stage is shared and prepended to each fragment source. Sources may carry
//! `#ifdef KEYWORD` / `#else` / `#endif` blocks which are resolved before the
//! source reaches the shader compiler, so a variant never branches at runtime.

use std::collections::{BTreeSet, HashMap};

pub const SHADING: &str = "SHADING";
pub const MANUAL_FILTERING: &str = "MANUAL_FILTERING";

pub const BASE_VERTEX: &str = include_str!("shaders/base.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Copy,
    Clear,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Display,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 10] = [
        ProgramKind::Copy,
        ProgramKind::Clear,
        ProgramKind::Splat,
        ProgramKind::Advection,
        ProgramKind::Divergence,
        ProgramKind::Curl,
        ProgramKind::Vorticity,
        ProgramKind::Pressure,
        ProgramKind::GradientSubtract,
        ProgramKind::Display,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Copy => "copy",
            ProgramKind::Clear => "clear",
            ProgramKind::Splat => "splat",
            ProgramKind::Advection => "advection",
            ProgramKind::Divergence => "divergence",
            ProgramKind::Curl => "curl",
            ProgramKind::Vorticity => "vorticity",
            ProgramKind::Pressure => "pressure",
            ProgramKind::GradientSubtract => "gradient_subtract",
            ProgramKind::Display => "display",
        }
    }

    pub fn fragment_source(self) -> &'static str {
        match self {
            ProgramKind::Copy => include_str!("shaders/copy.wgsl"),
            ProgramKind::Clear => include_str!("shaders/clear.wgsl"),
            ProgramKind::Splat => include_str!("shaders/splat.wgsl"),
            ProgramKind::Advection => include_str!("shaders/advection.wgsl"),
            ProgramKind::Divergence => include_str!("shaders/divergence.wgsl"),
            ProgramKind::Curl => include_str!("shaders/curl.wgsl"),
            ProgramKind::Vorticity => include_str!("shaders/vorticity.wgsl"),
            ProgramKind::Pressure => include_str!("shaders/pressure.wgsl"),
            ProgramKind::GradientSubtract => include_str!("shaders/gradient_subtract.wgsl"),
            ProgramKind::Display => include_str!("shaders/display.wgsl"),
        }
    }

    /// Sampled inputs in binding order. Texture `i` sits at binding `1 + 2i`
    /// and its sampler at `2 + 2i`; binding 0 is the shared uniform block.
    pub fn inputs(self) -> &'static [&'static str] {
        match self {
            ProgramKind::Copy | ProgramKind::Clear | ProgramKind::Display => &["u_texture"],
            ProgramKind::Splat => &["u_target"],
            ProgramKind::Advection => &["u_velocity", "u_source"],
            ProgramKind::Divergence | ProgramKind::Curl => &["u_velocity"],
            ProgramKind::Vorticity => &["u_velocity", "u_curl"],
            ProgramKind::Pressure => &["u_pressure", "u_divergence"],
            ProgramKind::GradientSubtract => &["u_pressure", "u_velocity"],
        }
    }

    /// Full source of one variant: shared vertex stage plus the specialized
    /// fragment stage.
    pub fn source(self, keywords: &KeywordSet) -> String {
        let fragment = preprocess(self.fragment_source(), keywords);
        format!("{BASE_VERTEX}\n{fragment}")
    }
}

/// Order-independent set of compile-time keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeywordSet(BTreeSet<&'static str>);

impl KeywordSet {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self(keywords.iter().copied().collect())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.0.contains(keyword)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves `#ifdef` / `#ifndef` / `#else` / `#endif` lines against `keywords`.
/// Blocks nest; directive lines themselves are dropped.
pub fn preprocess(source: &str, keywords: &KeywordSet) -> String {
    // One entry per open block: whether its current branch is taken.
    let mut stack: Vec<bool> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(keyword) = trimmed.strip_prefix("#ifdef") {
            stack.push(keywords.contains(keyword.trim()));
        } else if let Some(keyword) = trimmed.strip_prefix("#ifndef") {
            stack.push(!keywords.contains(keyword.trim()));
        } else if trimmed.starts_with("#else") {
            if let Some(top) = stack.last_mut() {
                *top = !*top;
            }
        } else if trimmed.starts_with("#endif") {
            stack.pop();
        } else if stack.iter().all(|&taken| taken) {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}

/// A fragment source with one compiled program per keyword combination.
///
/// Programs are compiled the first time their combination is selected. A
/// failed compile is cached as `None` so it is neither retried every frame nor
/// bound.
#[derive(Clone)]
pub struct Material<P> {
    kind: ProgramKind,
    programs: HashMap<KeywordSet, Option<P>>,
    active: Option<KeywordSet>,
}

impl<P> Material<P> {
    pub fn new(kind: ProgramKind) -> Self {
        Self {
            kind,
            programs: HashMap::new(),
            active: None,
        }
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn set_keywords(
        &mut self,
        keywords: &[&'static str],
        compile: impl FnOnce(ProgramKind, &KeywordSet) -> Option<P>,
    ) {
        let key = KeywordSet::new(keywords);
        if !self.programs.contains_key(&key) {
            log::debug!("compiling {} variant {:?}", self.kind.name(), key);
            let program = compile(self.kind, &key);
            self.programs.insert(key.clone(), program);
        }
        self.active = Some(key);
    }

    /// The program bound by the last `set_keywords`, if it compiled.
    pub fn active(&self) -> Option<&P> {
        let key = self.active.as_ref()?;
        self.programs.get(key)?.as_ref()
    }

    pub fn active_keywords(&self) -> Option<&KeywordSet> {
        self.active.as_ref()
    }

    pub fn compiled_variants(&self) -> usize {
        self.programs.len()
    }
}
