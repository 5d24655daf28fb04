//! Geometric handle of a spatial agent.

use spark_common::{Rgba, Shape, Vector};

use crate::agent::{AgentId, KindId};

/// Handle of a node inside one space's slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Mass, velocity and the force accumulated during the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub velocity: Vector,
    pub mass: f64,
    pub(crate) force: Vector,
}

impl Body {
    pub fn new(mass: f64) -> Self {
        Body {
            velocity: Vector::ZERO,
            mass: if mass > 0.0 { mass } else { 1.0 },
            force: Vector::ZERO,
        }
    }

    pub fn force(&self) -> Vector {
        self.force
    }

    pub fn apply_force(&mut self, f: Vector) {
        self.force += f;
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::new(1.0)
    }
}

/// Everything needed to create a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub position: Vector,
    pub radius: f64,
    pub shape: Shape,
    pub rotation: f64,
    pub color: Rgba,
    pub body: Option<Body>,
}

impl NodeSpec {
    pub fn circle(position: Vector, radius: f64) -> Self {
        NodeSpec {
            position,
            radius,
            shape: Shape::Circle,
            rotation: 0.0,
            color: Rgba::WHITE,
            body: None,
        }
    }

    pub fn square(position: Vector, half_side: f64) -> Self {
        NodeSpec {
            shape: Shape::Square,
            ..NodeSpec::circle(position, half_side)
        }
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }
}

/// A node registered in a space.
///
/// `position` is what every query sees; `new_position` is a staged move applied by the
/// space's commit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceNode {
    pub(crate) position: Vector,
    pub(crate) new_position: Option<Vector>,
    pub(crate) new_radius: Option<f64>,
    pub(crate) radius: f64,
    pub(crate) shape: Shape,
    pub rotation: f64,
    pub color: Rgba,
    pub(crate) owner: Option<AgentId>,
    pub(crate) kind: Option<KindId>,
    pub body: Option<Body>,
}

impl SpaceNode {
    pub(crate) fn from_spec(spec: NodeSpec, owner: Option<AgentId>, kind: Option<KindId>) -> Self {
        SpaceNode {
            position: spec.position,
            new_position: None,
            new_radius: None,
            radius: spec.radius.max(0.0),
            shape: spec.shape,
            rotation: spec.rotation,
            color: spec.color,
            owner,
            kind,
            body: spec.body,
        }
    }

    pub fn position(&self) -> Vector {
        self.position
    }

    /// Staged target position, if a move is pending.
    pub fn new_position(&self) -> Option<Vector> {
        self.new_position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn owner(&self) -> Option<AgentId> {
        self.owner
    }

    pub fn kind(&self) -> Option<KindId> {
        self.kind
    }

    /// Shape-aware overlap test; `d` is the displacement from `self` to `other`.
    pub fn intersects(&self, other: &SpaceNode, d: Vector) -> bool {
        shapes_intersect(d, self.shape, self.radius, other.shape, other.radius)
    }
}

/// Overlap test between two shapes whose centres are `d` apart (from a to b).
///
/// Squares are axis aligned with half side = radius.
pub fn shapes_intersect(d: Vector, shape_a: Shape, ra: f64, shape_b: Shape, rb: f64) -> bool {
    match (shape_a, shape_b) {
        (Shape::Circle, Shape::Circle) => {
            let reach = ra + rb;
            d.length_squared() <= reach * reach
        }
        (Shape::Square, Shape::Square) => {
            let reach = ra + rb;
            d.x.abs() <= reach && d.y.abs() <= reach && d.z.abs() <= reach
        }
        (Shape::Circle, Shape::Square) => circle_square(-d, ra, rb),
        (Shape::Square, Shape::Circle) => circle_square(d, rb, ra),
    }
}

// `to_circle`: displacement from the square's centre to the circle's centre.
fn circle_square(to_circle: Vector, circle_radius: f64, half: f64) -> bool {
    let closest = Vector::new(
        to_circle.x.clamp(-half, half),
        to_circle.y.clamp(-half, half),
        to_circle.z.clamp(-half, half),
    );
    (to_circle - closest).length_squared() <= circle_radius * circle_radius
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(spec: NodeSpec) -> SpaceNode {
        SpaceNode::from_spec(spec, None, None)
    }

    #[test]
    fn circles_intersect_within_sum_of_radii() {
        let a = node(NodeSpec::circle(Vector::xy(0.0, 0.0), 1.0));
        let near = node(NodeSpec::circle(Vector::xy(1.5, 0.0), 1.0));
        let far = node(NodeSpec::circle(Vector::xy(3.0, 0.0), 1.0));
        assert!(a.intersects(&near, near.position - a.position));
        assert!(!a.intersects(&far, far.position - a.position));
    }

    #[test]
    fn squares_use_aabb() {
        let d = Vector::xy(1.9, 1.9);
        assert!(shapes_intersect(d, Shape::Square, 1.0, Shape::Square, 1.0));
        // Circles of the same radii miss at this diagonal.
        assert!(!shapes_intersect(d, Shape::Circle, 1.0, Shape::Circle, 1.0));
    }

    #[test]
    fn circle_square_uses_closest_point() {
        // Circle at the origin, square centred at (2, 2) with half side 1: corner at (1, 1).
        let d = Vector::xy(2.0, 2.0);
        assert!(!shapes_intersect(d, Shape::Circle, 1.3, Shape::Square, 1.0));
        assert!(shapes_intersect(d, Shape::Circle, 1.5, Shape::Square, 1.0));
        assert!(shapes_intersect(-d, Shape::Square, 1.0, Shape::Circle, 1.5));
    }

    #[test]
    fn body_rejects_non_positive_mass() {
        assert_eq!(Body::new(0.0).mass, 1.0);
    }
}
