//! Render-target format negotiation.
//!
//! Hardware frequently refuses the narrow float formats while accepting the
//! wide ones, so each field asks for the narrowest layout it needs and walks
//! towards four channels until a probe succeeds. Half precision is preferred
//! over full precision at every layout.

use crate::error::FluidError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channels {
    One,
    Two,
    Four,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::One => 1,
            Channels::Two => 2,
            Channels::Four => 4,
        }
    }

    /// The wider layout to try when this one cannot be rendered to.
    pub fn widen(self) -> Option<Channels> {
        match self {
            Channels::One => Some(Channels::Two),
            Channels::Two => Some(Channels::Four),
            Channels::Four => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Half,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub channels: Channels,
    pub precision: Precision,
}

/// Outcome of probing a single format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSupport {
    pub renderable: bool,
    pub filterable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Dye field.
    pub rgba: Format,
    /// Velocity field.
    pub rg: Format,
    /// Pressure, divergence and curl.
    pub r: Format,
    pub linear_filtering: bool,
}

impl Capabilities {
    /// Every requested layout available in half precision with filtering.
    pub fn full() -> Self {
        let half = |channels| Format {
            channels,
            precision: Precision::Half,
        };
        Self {
            rgba: half(Channels::Four),
            rg: half(Channels::Two),
            r: half(Channels::One),
            linear_filtering: true,
        }
    }

    /// Same formats as [`Capabilities::full`] but without hardware filtering.
    pub fn without_linear_filtering() -> Self {
        Self {
            linear_filtering: false,
            ..Self::full()
        }
    }

    pub fn formats(&self) -> [Format; 3] {
        [self.rgba, self.rg, self.r]
    }
}

/// Picks a format for every field layout using `probe`.
///
/// Fails only when no four-channel float target can be rendered to, which
/// leaves nothing to degrade to.
pub fn negotiate(
    mut probe: impl FnMut(Format) -> FormatSupport,
) -> Result<Capabilities, FluidError> {
    let mut filterable = true;
    let mut pick = |requested: Channels| -> Result<Format, FluidError> {
        for precision in [Precision::Half, Precision::Full] {
            let mut channels = Some(requested);
            while let Some(current) = channels {
                let format = Format {
                    channels: current,
                    precision,
                };
                let support = probe(format);
                if support.renderable {
                    filterable &= support.filterable;
                    return Ok(format);
                }
                channels = current.widen();
            }
        }
        Err(FluidError::Unsupported(format!(
            "no renderable float format for {} channel field",
            requested.count()
        )))
    };

    let rgba = pick(Channels::Four)?;
    let rg = pick(Channels::Two)?;
    let r = pick(Channels::One)?;

    let caps = Capabilities {
        rgba,
        rg,
        r,
        linear_filtering: filterable,
    };
    if caps != Capabilities::full() {
        log::warn!("degraded render target formats: {caps:?}");
    }
    Ok(caps)
}
