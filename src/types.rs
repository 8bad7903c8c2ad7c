/// Unique identifier for a node in the network graph arena (spec section 9:
/// "an arena of layer nodes keyed by stable integer ids").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Materialization precision, chosen per vertex or per `materialize()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitWidth {
    Bits32,
    Bits16,
    Bits8,
}

impl BitWidth {
    pub fn as_u8(self) -> u8 {
        match self {
            BitWidth::Bits32 => 32,
            BitWidth::Bits16 => 16,
            BitWidth::Bits8 => 8,
        }
    }

    pub fn from_u8(bits: u8) -> Option<Self> {
        match bits {
            32 => Some(BitWidth::Bits32),
            16 => Some(BitWidth::Bits16),
            8 => Some(BitWidth::Bits8),
            _ => None,
        }
    }

    /// Mixed-precision loss scaling constant for fully-connected weight
    /// updates (spec section 4.2), preserved exactly from the source.
    pub fn weight_update_scale(self) -> f32 {
        match self {
            BitWidth::Bits32 => 0.5,
            BitWidth::Bits16 => 2.0,
            BitWidth::Bits8 => 3.0,
        }
    }

    /// Bias update scaling (spec section 4.2): 0.1 for 32-bit damps bias
    /// oscillation; 16-bit scales by 2.0 below a learning rate of 0.45, and
    /// 8-bit by 3.0 below 0.3, to compensate for the coarser storage
    /// precision. Thresholds preserved exactly from `MBGDOptimizer`.
    pub fn bias_update_scale(self, learning_rate: f32) -> f32 {
        match self {
            BitWidth::Bits32 => 0.1,
            BitWidth::Bits16 => {
                if learning_rate < 0.45 {
                    2.0
                } else {
                    1.0
                }
            }
            BitWidth::Bits8 => {
                if learning_rate < 0.3 {
                    3.0
                } else {
                    1.0
                }
            }
        }
    }
}

pub type Shape3 = (usize, usize, usize);
