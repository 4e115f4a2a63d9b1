//! Boids: cohesion, separation, and alignment over a 2D flock.
//!
//! Every step reads from a snapshot of the previous state, so the order in
//! which boids are updated does not leak into the result.
//!
//! Peer averages exclude the boid itself and divide by the peer count. A
//! single boid has no peers, so all three rules contribute zero and only the
//! boundary bounce can move it. An empty flock steps as a no-op.

use crate::math::TAU;
use crate::random::RandomStream;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Boid {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockRules {
    /// Fraction of the distance to the peers' centre of mass added per step.
    pub cohesion: f32,
    /// Peers closer than this push the boid away.
    pub too_close: f32,
    /// Fraction of the difference to the peers' mean velocity added per step.
    pub alignment: f32,
    /// Per-axis clamp applied to the displacement of one step.
    pub max_velocity: f32,
}

impl Default for FlockRules {
    fn default() -> Self {
        Self {
            cohesion: 0.00125,
            too_close: 4.0,
            alignment: 0.0125,
            max_velocity: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Flock {
    boids: Vec<Boid>,
    rules: FlockRules,
    min: [f32; 2],
    max: [f32; 2],
    rng: RandomStream,
}

impl Flock {
    /// `count` stationary boids evenly spaced on a circle, confined to the
    /// `[min, max]` box. The flock forks its own stream from `rng` for
    /// boundary bounces.
    pub fn ring(
        rng: &mut RandomStream,
        count: usize,
        centre: [f32; 2],
        radius: f32,
        min: [f32; 2],
        max: [f32; 2],
    ) -> Self {
        let boids = (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * TAU;
                Boid {
                    position: [
                        centre[0] + angle.cos() * radius,
                        centre[1] + angle.sin() * radius,
                    ],
                    velocity: [0.0, 0.0],
                }
            })
            .collect();
        Self {
            boids,
            rules: FlockRules::default(),
            min,
            max,
            rng: rng.fork(),
        }
    }

    pub fn with_rules(mut self, rules: FlockRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &FlockRules {
        &self.rules
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    /// Pull toward the peers' centre of mass.
    pub fn cohesion(&self, index: usize) -> [f32; 2] {
        cohesion(&self.boids, index, &self.rules)
    }

    /// Push away from peers inside the too-close radius.
    pub fn separation(&self, index: usize) -> [f32; 2] {
        separation(&self.boids, index, &self.rules)
    }

    /// Nudge toward the peers' mean velocity.
    pub fn alignment(&self, index: usize) -> [f32; 2] {
        alignment(&self.boids, index, &self.rules)
    }

    /// Advances every boid by one step.
    pub fn step(&mut self) {
        if self.boids.is_empty() {
            return;
        }
        let snapshot = self.boids.clone();
        let limit = self.rules.max_velocity;
        for (index, boid) in self.boids.iter_mut().enumerate() {
            let c = cohesion(&snapshot, index, &self.rules);
            let s = separation(&snapshot, index, &self.rules);
            let a = alignment(&snapshot, index, &self.rules);
            let mut velocity = [
                boid.velocity[0] + c[0] + s[0] + a[0],
                boid.velocity[1] + c[1] + s[1] + a[1],
            ];
            for axis in 0..2 {
                let predicted = boid.position[axis] + velocity[axis];
                if predicted < self.min[axis] {
                    velocity[axis] = self.rng.next();
                } else if predicted > self.max[axis] {
                    velocity[axis] = -self.rng.next();
                }
            }
            boid.velocity = velocity;
            boid.position[0] += velocity[0].clamp(-limit, limit);
            boid.position[1] += velocity[1].clamp(-limit, limit);
        }
    }

    /// Draw radius used by the sketches: faster boids look bigger.
    pub fn radius(boid: &Boid) -> f32 {
        let speed = (boid.velocity[0].powi(2) + boid.velocity[1].powi(2)).sqrt();
        1.0 + speed * 0.5
    }
}

fn peers(boids: &[Boid], index: usize) -> impl Iterator<Item = &Boid> {
    boids
        .iter()
        .enumerate()
        .filter(move |(other, _)| *other != index)
        .map(|(_, boid)| boid)
}

fn cohesion(boids: &[Boid], index: usize, rules: &FlockRules) -> [f32; 2] {
    let count = boids.len().saturating_sub(1);
    if count == 0 {
        return [0.0, 0.0];
    }
    let mut centre = [0.0f32, 0.0];
    for peer in peers(boids, index) {
        centre[0] += peer.position[0];
        centre[1] += peer.position[1];
    }
    let own = boids[index].position;
    [
        (centre[0] / count as f32 - own[0]) * rules.cohesion,
        (centre[1] / count as f32 - own[1]) * rules.cohesion,
    ]
}

fn separation(boids: &[Boid], index: usize, rules: &FlockRules) -> [f32; 2] {
    let own = boids[index].position;
    let mut push = [0.0f32, 0.0];
    for peer in peers(boids, index) {
        let dx = peer.position[0] - own[0];
        let dy = peer.position[1] - own[1];
        if (dx * dx + dy * dy).sqrt() < rules.too_close {
            push[0] -= dx;
            push[1] -= dy;
        }
    }
    push
}

fn alignment(boids: &[Boid], index: usize, rules: &FlockRules) -> [f32; 2] {
    let count = boids.len().saturating_sub(1);
    if count == 0 {
        return [0.0, 0.0];
    }
    let mut mean = [0.0f32, 0.0];
    for peer in peers(boids, index) {
        mean[0] += peer.velocity[0];
        mean[1] += peer.velocity[1];
    }
    let own = boids[index].velocity;
    [
        (mean[0] / count as f32 - own[0]) * rules.alignment,
        (mean[1] / count as f32 - own[1]) * rules.alignment,
    ]
}
