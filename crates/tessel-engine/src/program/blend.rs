use super::AlphaMode;

/// Porter-Duff compositing operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    Clear,
    Src,
    Dst,
    Over,
    OverReverse,
    In,
    InReverse,
    Out,
    OutReverse,
    Atop,
    AtopReverse,
    Xor,
    Add,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcColor,
    OneMinusSrcColor,
    Src1Color,
    OneMinusSrc1Color,
    DstColor,
    OneMinusDstColor,
}

impl BlendFactor {
    pub fn uses_dual_source(self) -> bool {
        matches!(self, BlendFactor::Src1Color | BlendFactor::OneMinusSrc1Color)
    }
}

/// `result = src * src_factor + dst * dst_factor`, per channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendState {
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src, dst }
    }

    pub fn uses_dual_source(&self) -> bool {
        self.src.uses_dual_source() || self.dst.uses_dual_source()
    }
}

impl CompositeOp {
    pub const ALL: [CompositeOp; 13] = [
        CompositeOp::Clear,
        CompositeOp::Src,
        CompositeOp::Dst,
        CompositeOp::Over,
        CompositeOp::OverReverse,
        CompositeOp::In,
        CompositeOp::InReverse,
        CompositeOp::Out,
        CompositeOp::OutReverse,
        CompositeOp::Atop,
        CompositeOp::AtopReverse,
        CompositeOp::Xor,
        CompositeOp::Add,
    ];

    /// Source and destination factors on premultiplied color.
    pub const fn factors(self) -> (BlendFactor, BlendFactor) {
        use BlendFactor::*;
        match self {
            CompositeOp::Clear => (Zero, Zero),
            CompositeOp::Src => (One, Zero),
            CompositeOp::Dst => (Zero, One),
            CompositeOp::Over => (One, OneMinusSrcAlpha),
            CompositeOp::OverReverse => (OneMinusDstAlpha, One),
            CompositeOp::In => (DstAlpha, Zero),
            CompositeOp::InReverse => (Zero, SrcAlpha),
            CompositeOp::Out => (OneMinusDstAlpha, Zero),
            CompositeOp::OutReverse => (Zero, OneMinusSrcAlpha),
            CompositeOp::Atop => (DstAlpha, OneMinusSrcAlpha),
            CompositeOp::AtopReverse => (OneMinusDstAlpha, SrcAlpha),
            CompositeOp::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
            CompositeOp::Add => (One, One),
        }
    }
}

/// Fixed-function blend for one draw.
///
/// Returns `None` when the result is a plain write (`One`, `Zero`).
/// `dst_has_alpha` is false for targets without a stored alpha channel, which
/// read as opaque. `dst_alpha_in_red` marks single-channel targets whose red
/// channel holds alpha.
pub fn blend_for(
    op: CompositeOp,
    alpha: AlphaMode,
    dst_has_alpha: bool,
    dst_alpha_in_red: bool,
) -> Option<BlendState> {
    use BlendFactor::*;

    let (mut src, mut dst) = match alpha {
        AlphaMode::Normal => op.factors(),
        AlphaMode::CaFirst => (Zero, OneMinusSrcColor),
        AlphaMode::CaSecond => (One, One),
        AlphaMode::DualBlend => {
            let (s, d) = op.factors();
            let d = match d {
                SrcAlpha => Src1Color,
                OneMinusSrcAlpha => OneMinusSrc1Color,
                other => other,
            };
            (s, d)
        }
    };

    if !dst_has_alpha {
        src = match src {
            DstAlpha => One,
            OneMinusDstAlpha => Zero,
            other => other,
        };
    } else if dst_alpha_in_red {
        src = match src {
            DstAlpha => DstColor,
            OneMinusDstAlpha => OneMinusDstColor,
            other => other,
        };
    }
    if dst_alpha_in_red {
        dst = match dst {
            DstAlpha => DstColor,
            OneMinusDstAlpha => OneMinusDstColor,
            other => other,
        };
    }

    if src == One && dst == Zero {
        None
    } else {
        Some(BlendState::new(src, dst))
    }
}

/// Depths whose surfaces store alpha.
pub fn depth_has_alpha(depth: u8) -> bool {
    matches!(depth, 8 | 32)
}
