//! Contacts between pairs of bodies.

pub mod solver;

use crate::{
    body::{BodyID, BodyManager},
    collision::{Manifold, world_manifold::WorldManifold},
    fph,
};
use bitflags::bitflags;

/// The collision related properties of a shape attached to a body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactShape {
    pub body: BodyID,
    /// Rounding radius of the shape (the radius of a circle, or the skin
    /// thickness of a polygon).
    pub radius: fph,
    pub friction: fph,
    pub restitution: fph,
}

/// A potential contact between the shapes of two bodies, holding the current
/// manifold and the material properties used for solving it.
#[derive(Clone, Debug)]
pub struct Contact {
    body_a: BodyID,
    body_b: BodyID,
    radius_a: fph,
    radius_b: fph,
    friction: fph,
    restitution: fph,
    tangent_speed: fph,
    manifold: Manifold,
    flags: ContactFlags,
}

bitflags! {
    /// Bitflags encoding the state of a [`Contact`].
    #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
    pub struct ContactFlags: u8 {
        /// The contact takes part in constraint solving.
        const ENABLED = 1 << 0;
        /// The shapes are touching, so the manifold has points.
        const TOUCHING = 1 << 1;
    }
}

/// Combines the friction coefficients of two shapes.
pub fn mix_friction(friction_a: fph, friction_b: fph) -> fph {
    (friction_a * friction_b).sqrt()
}

/// Combines the restitution coefficients of two shapes. A bouncy shape makes
/// anything bounce off it.
pub fn mix_restitution(restitution_a: fph, restitution_b: fph) -> fph {
    restitution_a.max(restitution_b)
}

impl Contact {
    /// Creates a new enabled, non-touching contact between the two given
    /// shapes.
    pub fn new(shape_a: &ContactShape, shape_b: &ContactShape) -> Self {
        Self {
            body_a: shape_a.body,
            body_b: shape_b.body,
            radius_a: shape_a.radius,
            radius_b: shape_b.radius,
            friction: mix_friction(shape_a.friction, shape_b.friction),
            restitution: mix_restitution(shape_a.restitution, shape_b.restitution),
            tangent_speed: 0.0,
            manifold: Manifold::default(),
            flags: ContactFlags::ENABLED,
        }
    }

    /// Creates a new contact between the two given shapes and installs the
    /// given manifold.
    pub fn with_manifold(
        shape_a: &ContactShape,
        shape_b: &ContactShape,
        manifold: Manifold,
    ) -> Self {
        let mut contact = Self::new(shape_a, shape_b);
        contact.update_manifold(manifold);
        contact
    }

    /// Returns the ID of the first body.
    pub fn body_a(&self) -> BodyID {
        self.body_a
    }

    /// Returns the ID of the second body.
    pub fn body_b(&self) -> BodyID {
        self.body_b
    }

    /// Returns the skin radius of the shape on body A.
    pub fn radius_a(&self) -> fph {
        self.radius_a
    }

    /// Returns the skin radius of the shape on body B.
    pub fn radius_b(&self) -> fph {
        self.radius_b
    }

    /// Returns the mixed friction coefficient.
    pub fn friction(&self) -> fph {
        self.friction
    }

    /// Returns the mixed restitution coefficient.
    pub fn restitution(&self) -> fph {
        self.restitution
    }

    /// The desired tangential speed of the surface of shape B relative to
    /// shape A, for conveyor belt behavior.
    pub fn tangent_speed(&self) -> fph {
        self.tangent_speed
    }

    /// Returns the current contact manifold.
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Returns the current contact manifold for modification.
    pub fn manifold_mut(&mut self) -> &mut Manifold {
        &mut self.manifold
    }

    /// Returns the state flags of the contact.
    pub fn flags(&self) -> ContactFlags {
        self.flags
    }

    /// Whether the contact has not been disabled by the user.
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// Whether the shapes were found to touch in the last manifold update.
    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    /// Whether the contact should be handed to the contact solver.
    pub fn is_active(&self) -> bool {
        self.flags
            .contains(ContactFlags::ENABLED | ContactFlags::TOUCHING)
            && self.manifold.point_count() > 0
    }

    /// Enables or disables the contact for the current step.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.flags.set(ContactFlags::ENABLED, enabled);
    }

    /// Overrides the mixed friction coefficient.
    pub fn set_friction(&mut self, friction: fph) {
        self.friction = friction;
    }

    /// Overrides the mixed restitution coefficient.
    pub fn set_restitution(&mut self, restitution: fph) {
        self.restitution = restitution;
    }

    /// Sets the target speed of body B relative to body A along the contact
    /// tangent, as for a conveyor belt.
    pub fn set_tangent_speed(&mut self, tangent_speed: fph) {
        self.tangent_speed = tangent_speed;
    }

    /// Installs the manifold computed by narrow phase for the current step.
    /// Accumulated impulses of points that persist from the previous manifold
    /// are carried over for warm starting. Returns whether the contact was
    /// touching before the update.
    pub fn update_manifold(&mut self, manifold: Manifold) -> bool {
        let was_touching = self.is_touching();

        let old_manifold = std::mem::replace(&mut self.manifold, manifold);
        self.manifold.inherit_impulses(&old_manifold);

        self.flags
            .set(ContactFlags::TOUCHING, self.manifold.point_count() > 0);

        was_touching
    }

    /// Computes the world space geometry of the current manifold.
    ///
    /// # Panics
    /// If either body does not exist.
    pub fn world_manifold(&self, bodies: &BodyManager) -> WorldManifold {
        WorldManifold::new(
            &self.manifold,
            &bodies.body(self.body_a).transform(),
            self.radius_a,
            &bodies.body(self.body_b).transform(),
            self.radius_b,
        )
    }
}
