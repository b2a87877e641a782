//! Teleport tunnels and reflecting cages.

use serde::{Deserialize, Serialize};

use crate::geometry::{EPSILON, direction, reflect};
use crate::{Position, Velocity};

/// Pair of portal mouths; entering either one exits at the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub a: Position,
    pub b: Position,
    pub radius: f32,
    pub color: [f32; 3],
}

impl Tunnel {
    #[must_use]
    pub fn new(a: Position, b: Position, radius: f32) -> Self {
        Self {
            a,
            b,
            radius,
            color: [0.6, 0.4, 1.0],
        }
    }

    /// Teleport a particle inside either mouth.
    ///
    /// Returns the exit position (`exit + jitter`); `velocity` keeps its speed and is
    /// turned to point along the entry→exit axis. Zero-length tunnels never fire.
    pub fn teleport(&self, position: Position, velocity: &mut Velocity, jitter: (f32, f32)) -> Option<Position> {
        let (entry, exit) = if position.distance_sq(self.a) < self.radius * self.radius {
            (self.a, self.b)
        } else if position.distance_sq(self.b) < self.radius * self.radius {
            (self.b, self.a)
        } else {
            return None;
        };
        let (axis, length) = direction(entry, exit);
        if length < EPSILON {
            return None;
        }
        let speed = velocity.speed();
        *velocity = Velocity::new(axis.0 * speed, axis.1 * speed);
        Some(Position::new(exit.x + jitter.0, exit.y + jitter.1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CageShape {
    Rect { min: Position, max: Position },
    Circle { center: Position, radius: f32 },
}

/// Region that keeps particles inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cage {
    pub shape: CageShape,
    /// Fraction of speed kept on reflection.
    pub elasticity: f32,
}

impl Cage {
    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        match self.shape {
            CageShape::Rect { min, max } => p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y,
            CageShape::Circle { center, radius } => p.distance_sq(center) <= radius * radius,
        }
    }

    /// Reflect a particle that was inside at `previous` and tried to leave.
    ///
    /// Returns true when the particle was turned back.
    pub fn contain(&self, previous: Position, position: &mut Position, velocity: &mut Velocity) -> bool {
        if !self.contains(previous) || self.contains(*position) {
            return false;
        }
        match self.shape {
            CageShape::Rect { min, max } => {
                if position.x < min.x || position.x > max.x {
                    position.x = position.x.clamp(min.x, max.x);
                    velocity.vx = -velocity.vx * self.elasticity;
                    velocity.vy *= self.elasticity;
                }
                if position.y < min.y || position.y > max.y {
                    position.y = position.y.clamp(min.y, max.y);
                    velocity.vy = -velocity.vy * self.elasticity;
                    velocity.vx *= self.elasticity;
                }
            }
            CageShape::Circle { center, radius } => {
                let (normal, dist) = direction(center, *position);
                if dist < EPSILON {
                    return false;
                }
                let inset = radius * (1.0 - EPSILON);
                *position = Position::new(center.x + normal.0 * inset, center.y + normal.1 * inset);
                let bounced = reflect(*velocity, normal);
                *velocity = Velocity::new(bounced.vx * self.elasticity, bounced.vy * self.elasticity);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teleport_preserves_speed_and_aligns_with_axis() {
        let tunnel = Tunnel::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.5), 0.05);
        let mut vel = Velocity::new(0.0, -0.8);
        let exit = tunnel
            .teleport(Position::new(-0.49, 0.01), &mut vel, (0.001, 0.0))
            .expect("inside mouth");
        assert!((exit.x - 0.501).abs() < 1e-6);
        assert!((exit.y - 0.5).abs() < 1e-6);
        assert!((vel.speed() - 0.8).abs() < 1e-5);
        assert!((vel.vy / vel.vx - 0.5).abs() < 1e-5);
    }

    #[test]
    fn tunnel_is_bidirectional_and_ignores_outsiders() {
        let tunnel = Tunnel::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.0), 0.05);
        let mut vel = Velocity::new(0.3, 0.0);
        let exit = tunnel.teleport(Position::new(0.5, 0.0), &mut vel, (0.0, 0.0));
        assert_eq!(exit, Some(Position::new(-0.5, 0.0)));
        assert!(vel.vx < 0.0);
        assert!(tunnel.teleport(Position::new(0.0, 0.0), &mut vel, (0.0, 0.0)).is_none());
    }

    #[test]
    fn rect_cage_reflects_escaping_particle() {
        let cage = Cage {
            shape: CageShape::Rect {
                min: Position::new(-0.2, -0.2),
                max: Position::new(0.2, 0.2),
            },
            elasticity: 0.5,
        };
        let mut pos = Position::new(0.25, 0.0);
        let mut vel = Velocity::new(1.0, 0.0);
        assert!(cage.contain(Position::new(0.18, 0.0), &mut pos, &mut vel));
        assert_eq!(pos.x, 0.2);
        assert_eq!(vel.vx, -0.5);

        let mut outside = Position::new(0.5, 0.0);
        assert!(!cage.contain(Position::new(0.4, 0.0), &mut outside, &mut vel));
    }

    #[test]
    fn circle_cage_projects_back_inside() {
        let cage = Cage {
            shape: CageShape::Circle {
                center: Position::default(),
                radius: 0.3,
            },
            elasticity: 1.0,
        };
        let mut pos = Position::new(0.0, 0.35);
        let mut vel = Velocity::new(0.0, 1.0);
        assert!(cage.contain(Position::new(0.0, 0.29), &mut pos, &mut vel));
        assert!(cage.contains(pos));
        assert!((vel.vy + 1.0).abs() < 1e-6);
    }
}
