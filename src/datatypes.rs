use log::warn;
use nalgebra::{matrix, SMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// Declares which half of an axis' (displacement, force) pair is the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KnownType {
    Force,
    #[default]
    Displacement,
}

/// One mesh point with its boundary data
///
/// Per axis, the slot named by `known` is the prescribed input and the other
/// slot holds the value computed by the last solve. Changing `known` does not
/// touch either value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Node {
    position: Vertex,
    displacement: [f64; 2],
    force: [f64; 2],
    known: [KnownType; 2],
}

impl Node {
    /// A node at `(x, y)` with zero displacement and force, clamped on both axes
    pub fn zero_at(x: f64, y: f64) -> Node {
        Node {
            position: Vertex { x, y },
            ..Node::default()
        }
    }

    /// A node at `(x, y)` that is free on both axes with zero applied force
    pub fn free_at(x: f64, y: f64) -> Node {
        Node {
            position: Vertex { x, y },
            known: [KnownType::Force; 2],
            ..Node::default()
        }
    }

    pub fn position(&self) -> Vertex {
        self.position
    }

    pub fn pos_x(&self) -> f64 {
        self.position.x
    }
    pub fn pos_y(&self) -> f64 {
        self.position.y
    }
    pub fn set_pos_x(&mut self, value: f64) {
        self.position.x = value;
    }
    pub fn set_pos_y(&mut self, value: f64) {
        self.position.y = value;
    }

    pub fn disp_x(&self) -> f64 {
        self.displacement[0]
    }
    pub fn disp_y(&self) -> f64 {
        self.displacement[1]
    }
    pub fn set_disp_x(&mut self, value: f64) {
        self.displacement[0] = value;
    }
    pub fn set_disp_y(&mut self, value: f64) {
        self.displacement[1] = value;
    }

    pub fn force_x(&self) -> f64 {
        self.force[0]
    }
    pub fn force_y(&self) -> f64 {
        self.force[1]
    }
    pub fn set_force_x(&mut self, value: f64) {
        self.force[0] = value;
    }
    pub fn set_force_y(&mut self, value: f64) {
        self.force[1] = value;
    }

    pub fn known_x(&self) -> KnownType {
        self.known[0]
    }
    pub fn known_y(&self) -> KnownType {
        self.known[1]
    }
    pub fn set_known_x(&mut self, known: KnownType) {
        self.known[0] = known;
    }
    pub fn set_known_y(&mut self, known: KnownType) {
        self.known[1] = known;
    }

    /// Axis-indexed access used by the solver, `axis` is 0 for x and 1 for y
    pub(crate) fn known(&self, axis: usize) -> KnownType {
        self.known[axis]
    }
    pub(crate) fn displacement(&self, axis: usize) -> f64 {
        self.displacement[axis]
    }
    pub(crate) fn force(&self, axis: usize) -> f64 {
        self.force[axis]
    }
    pub(crate) fn load_result(&mut self, displacement: [f64; 2], force: [f64; 2]) {
        self.displacement = displacement;
        self.force = force;
    }
}

/// Constant in-plane stress of a T3 element
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stress {
    pub xx: f64,
    pub yy: f64,
    pub xy: f64,
}

impl Stress {
    /// Plane stress von Mises equivalent
    pub fn von_mises(&self) -> f64 {
        f64::sqrt(
            f64::powi(self.xx, 2) - self.xx * self.yy
                + f64::powi(self.yy, 2)
                + 3.0 * f64::powi(self.xy, 2),
        )
    }
}

/// A 3-node triangular patch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub(crate) nodes: [usize; 3],
    pub(crate) stress: Option<Stress>,
}

impl Element {
    pub(crate) fn new(nodes: [usize; 3]) -> Element {
        Element {
            nodes,
            stress: None,
        }
    }

    pub fn node_indices(&self) -> [usize; 3] {
        self.nodes
    }

    /// Stress from the last successful solve, if any
    pub fn stress(&self) -> Option<Stress> {
        self.stress
    }
}

/// Isotropic plane stress material
///
/// The shear modulus is an independent parameter; use [`Material::isotropic`]
/// to derive it from the other two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub shear_modulus: f64,
}

impl Material {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64, shear_modulus: f64) -> Material {
        if youngs_modulus <= 0.0 || shear_modulus <= 0.0 {
            warn!(
                "non-positive material modulus (E = {youngs_modulus}, G = {shear_modulus}), \
                 the stiffness matrix will not be positive definite"
            );
        }
        if !(-1.0 < poisson_ratio && poisson_ratio < 0.5) {
            warn!("poisson ratio {poisson_ratio} is outside the physical range (-1, 0.5)");
        }
        Material {
            youngs_modulus,
            poisson_ratio,
            shear_modulus,
        }
    }

    /// Material with `G = E / (2(1 + nu))`
    pub fn isotropic(youngs_modulus: f64, poisson_ratio: f64) -> Material {
        Material::new(
            youngs_modulus,
            poisson_ratio,
            youngs_modulus / (2.0 * (1.0 + poisson_ratio)),
        )
    }

    /// Calculates the plane stress stress-strain matrix
    ///
    /// # Returns
    /// A 3x3 matrix mapping `(exx, eyy, gxy)` to `(sxx, syy, txy)`
    pub fn stress_strain_matrix(&self) -> SMatrix<f64, 3, 3> {
        let nu = self.poisson_ratio;
        let ep = self.youngs_modulus / (1.0 - f64::powi(nu, 2));

        matrix![
            ep, ep * nu, 0.0;
            ep * nu, ep, 0.0;
            0.0, 0.0, self.shear_modulus;
        ]
    }
}
