//! Message type specialisations.

use ab_core::{AbError, VariableSpec};

/// Names of the location variables spatial messages carry, in axis order.
pub const LOCATION_VARIABLES: [&str; 3] = ["x", "y", "z"];

/// Specialisation tag of a message input or output.
///
/// `None` marks an agent function without a message on that side; kernels
/// are specialised per (input kind, output kind) pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    None,
    BruteForce,
    Spatial2D,
    Spatial3D,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] =
        [MessageKind::None, MessageKind::BruteForce, MessageKind::Spatial2D, MessageKind::Spatial3D];

    pub fn is_spatial(self) -> bool {
        matches!(self, MessageKind::Spatial2D | MessageKind::Spatial3D)
    }
}

/// Environment bounds and interaction radius of a spatial message type.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialBounds {
    pub min:    [f32; 3],
    pub max:    [f32; 3],
    pub radius: f32,
}

impl SpatialBounds {
    pub fn new_2d(min: [f32; 2], max: [f32; 2], radius: f32) -> Self {
        Self { min: [min[0], min[1], 0.0], max: [max[0], max[1], 0.0], radius }
    }

    pub fn new_3d(min: [f32; 3], max: [f32; 3], radius: f32) -> Self {
        Self { min, max, radius }
    }
}

/// A message type's specialisation and its parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    BruteForce,
    Spatial2D(SpatialBounds),
    Spatial3D(SpatialBounds),
}

impl MessageType {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageType::BruteForce   => MessageKind::BruteForce,
            MessageType::Spatial2D(_) => MessageKind::Spatial2D,
            MessageType::Spatial3D(_) => MessageKind::Spatial3D,
        }
    }

    pub fn bounds(&self) -> Option<&SpatialBounds> {
        match self {
            MessageType::BruteForce => None,
            MessageType::Spatial2D(b) | MessageType::Spatial3D(b) => Some(b),
        }
    }

    /// Number of spatial axes (0 for brute force).
    pub fn dimensions(&self) -> usize {
        match self {
            MessageType::BruteForce   => 0,
            MessageType::Spatial2D(_) => 2,
            MessageType::Spatial3D(_) => 3,
        }
    }

    /// Reserved variables every message of this type carries.
    pub fn implicit_variables(&self) -> Vec<VariableSpec> {
        LOCATION_VARIABLES[..self.dimensions()]
            .iter()
            .map(|name| VariableSpec::scalar::<f32>(*name))
            .collect()
    }

    /// Reject user variables that collide with the implicit ones.
    pub fn check_variable(&self, name: &str) -> Result<(), AbError> {
        if LOCATION_VARIABLES[..self.dimensions()].contains(&name) {
            return Err(AbError::DuplicateName { what: "message variable", name: name.to_owned() });
        }
        Ok(())
    }
}
