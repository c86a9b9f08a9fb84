use crate::{
    datatypes::{Element, KnownType, Material, Node, Stress},
    error::{HematiteError, Result, SingularCause},
};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra::{matrix, Cholesky, DMatrix, DVector, Dyn, SMatrix};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};

pub const DOF: usize = 2;

/// Smallest accepted ratio between a Cholesky pivot and the largest diagonal
/// stiffness entry
pub const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Smallest accepted ratio between twice an element's area and its longest
/// squared edge
pub const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Slack between the iterative solver's own residual estimate and the true one
const RESIDUAL_SLACK: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverMethod {
    /// Dense Cholesky factorization of the free-free stiffness block
    #[default]
    Cholesky,
    /// Conjugate gradient iterations, converged to a relative residual
    ConjugateGradient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Iteration cap for [`SolverMethod::ConjugateGradient`]
    pub max_iterations: u64,
    /// Target residual relative to the load vector norm
    pub target_cost: f64,
    /// Show a progress bar during iterative solves
    pub progress: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Cholesky,
            max_iterations: 100_000,
            target_cost: 1e-10,
            progress: false,
        }
    }
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a DMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok((self.a * DVector::from_column_slice(x)).as_slice().to_vec())
    }
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    initial_mag: Option<f64>,
    final_mag: f64,
}

impl ConjugateGradientObserverBar {
    fn new(target_cost: f64) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: ProgressBar::new(1000),
            initial_mag: None,
            final_mag: target_cost.log10(),
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        let cost_mag = state.get_cost().log10();
        if !cost_mag.is_finite() {
            return Ok(());
        }
        let initial_mag = *self.initial_mag.get_or_insert(cost_mag);
        let span = initial_mag - self.final_mag;
        if span > 0.0 {
            let fraction = ((initial_mag - cost_mag) / span).clamp(0.0, 1.0);
            self.bar.set_position((1000.0 * fraction) as u64);
        }

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> std::result::Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

fn executor_failure(err: Error) -> HematiteError {
    warn!("conjugate gradient error: {err}");
    HematiteError::Solver(err.to_string())
}

/// Solves a symmetric positive definite system with the conjugate gradient
/// method
///
/// # Arguments
/// * `a` - A square positive definite matrix
/// * `b` - The right hand side, must be nonzero
/// * `config` - Iteration limits and target residual
///
/// # Returns
/// The solution vector and the number of iterations used
fn run_conjugate_gradient(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    config: &SolverConfig,
) -> Result<(DVector<f64>, u64)> {
    let b_norm = b.norm();
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b.as_slice().to_vec());
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = ConjugateGradientOperator { a };

    let mut executor = Executor::new(operator, solver).configure(|state| {
        state
            .param(initial_guess)
            .max_iters(config.max_iterations)
            .target_cost(config.target_cost * b_norm)
    });
    if config.progress {
        executor = executor.add_observer(
            ConjugateGradientObserverBar::new(config.target_cost * b_norm),
            ObserverMode::NewBest,
        );
    }

    let res = executor.run().map_err(executor_failure)?;

    let iterations = res.state().get_iter();
    let x = match &res.state().best_param {
        Some(vec) => DVector::from_vec(vec.clone()),
        None => {
            return Err(SingularCause::NotConverged {
                residual: f64::INFINITY,
            }
            .into())
        }
    };

    let residual = (a * &x - b).norm() / b_norm;
    debug!("conjugate gradient finished after {iterations} iterations, residual {residual:e}");
    if !(residual <= config.target_cost * RESIDUAL_SLACK) {
        return Err(SingularCause::NotConverged { residual }.into());
    }

    Ok((x, iterations))
}

/// Factorizes a symmetric matrix, rejecting it unless it is positive definite
///
/// Fails with [`SingularCause::IllConditioned`] when the factorization breaks
/// down or its smallest pivot is negligible next to the largest diagonal entry.
fn factorize(a: &DMatrix<f64>) -> Result<Cholesky<f64, Dyn>> {
    let diagonal_max = a.diagonal().amax();

    let cholesky = match Cholesky::new(a.clone()) {
        Some(c) => c,
        None => return Err(SingularCause::IllConditioned { pivot: 0.0 }.into()),
    };

    let pivot_min = cholesky
        .l_dirty()
        .diagonal()
        .iter()
        .map(|l| l * l)
        .fold(f64::INFINITY, f64::min);
    let pivot = pivot_min / diagonal_max;
    if !(pivot >= SINGULAR_TOLERANCE) {
        return Err(SingularCause::IllConditioned { pivot }.into());
    }

    Ok(cholesky)
}

/// Solves a symmetric positive definite system by Cholesky factorization
fn run_cholesky(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    Ok(factorize(a)?.solve(b))
}

/// Calculates the signed area of the element, positive for counterclockwise
/// node order
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - The model's nodes
pub fn compute_element_area(element: &Element, nodes: &[Node]) -> f64 {
    let v0 = nodes[element.nodes[0]].position();
    let v1 = nodes[element.nodes[1]].position();
    let v2 = nodes[element.nodes[2]].position();

    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Whether the element has (numerically) no area. Repeated node indices and
/// non-finite coordinates count as degenerate.
pub fn is_degenerate(element: &Element, nodes: &[Node]) -> bool {
    let [a, b, c] = element.nodes;
    if a == b || b == c || a == c {
        return true;
    }
    let v = element.nodes.map(|i| nodes[i].position());
    let longest_edge = (0..3)
        .map(|k| {
            let (p, q) = (v[k], v[(k + 1) % 3]);
            f64::powi(p.x - q.x, 2) + f64::powi(p.y - q.y, 2)
        })
        .fold(0.0, f64::max);
    let area = compute_element_area(element, nodes);

    !(2.0 * area.abs() > DEGENERATE_TOLERANCE * longest_edge)
}

/// Calculates the strain-displacement matrix of the element
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - The model's nodes
/// * `element_area` - The signed area of the element
///
/// # Returns
/// A 3x6 strain-displacement matrix
pub fn compute_strain_displacement_matrix(
    element: &Element,
    nodes: &[Node],
    element_area: f64,
) -> SMatrix<f64, 3, 6> {
    let v0 = nodes[element.nodes[0]].position();
    let v1 = nodes[element.nodes[1]].position();
    let v2 = nodes[element.nodes[2]].position();

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, 6> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * element_area;

    strain_displacement_mat
}

/// Computes the stiffness matrix for a given element of unit thickness
///
/// # Returns
/// A 6x6 stiffness matrix ordered `(u0x, u0y, u1x, u1y, u2x, u2y)`
pub fn compute_element_stiffness_matrix(
    element: &Element,
    nodes: &[Node],
    material: &Material,
) -> SMatrix<f64, 6, 6> {
    let element_area = compute_element_area(element, nodes);
    let stress_strain_mat = material.stress_strain_matrix();
    let strain_displacement_mat = compute_strain_displacement_matrix(element, nodes, element_area);

    (strain_displacement_mat.transpose() * stress_strain_mat)
        * strain_displacement_mat
        * element_area.abs()
}

/// Compiles element stiffness matrices into a total stiffness matrix
///
/// # Arguments
/// * `node_count` - The number of nodes in the model
/// * `elements` - The model's elements
/// * `element_stiffness_matrices` - Element stiffness matrices in the same
///     order as `elements`
pub fn build_total_stiffness_matrix(
    node_count: usize,
    elements: &[Element],
    element_stiffness_matrices: &[SMatrix<f64, 6, 6>],
) -> DMatrix<f64> {
    let mut total_stiffness_matrix: DMatrix<f64> =
        DMatrix::zeros(DOF * node_count, DOF * node_count);

    for (stiffness_mat, element) in std::iter::zip(element_stiffness_matrices, elements) {
        for (local_row, node_row) in element.nodes.iter().enumerate() {
            for (local_col, node_col) in element.nodes.iter().enumerate() {
                for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    total_stiffness_matrix[(DOF * node_row + dr, DOF * node_col + dc)] +=
                        stiffness_mat[(DOF * local_row + dr, DOF * local_col + dc)];
                }
            }
        }
    }

    total_stiffness_matrix
}

/// Splits global degrees of freedom by their known type
///
/// # Returns
/// The force-known (free) and displacement-known (fixed) dof indices, in that order
fn partition_dofs(nodes: &[Node]) -> (Vec<usize>, Vec<usize>) {
    let mut free = Vec::new();
    let mut fixed = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        for axis in 0..DOF {
            match node.known(axis) {
                KnownType::Force => free.push(DOF * i + axis),
                KnownType::Displacement => fixed.push(DOF * i + axis),
            }
        }
    }
    (free, fixed)
}

/// Nodal displacements and forces after a solve, one entry per global dof
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub displacements: Vec<f64>,
    pub forces: Vec<f64>,
    pub stresses: Vec<Stress>,
}

/// Solves the partitioned system `K_ff u_f = f_f - K_fc u_c` and recovers the
/// reactions `f_c = K_c u`
///
/// # Arguments
/// * `nodes` - The model's nodes, providing the prescribed values
/// * `total_stiffness_matrix` - The assembled stiffness matrix
/// * `config` - Solver selection
///
/// # Returns
/// Full displacement and force vectors; prescribed entries are copied through
fn solve(
    nodes: &[Node],
    total_stiffness_matrix: &DMatrix<f64>,
    config: &SolverConfig,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let (free, fixed) = partition_dofs(nodes);
    info!(
        "solving system with {} unknown displacements and {} unknown forces",
        free.len(),
        fixed.len()
    );

    let mut displacements: Vec<f64> = Vec::with_capacity(DOF * nodes.len());
    let mut forces: Vec<f64> = Vec::with_capacity(DOF * nodes.len());
    for node in nodes {
        for axis in 0..DOF {
            displacements.push(node.displacement(axis));
            forces.push(node.force(axis));
        }
    }

    if !free.is_empty() {
        let unknown_matrix = DMatrix::from_fn(free.len(), free.len(), |r, c| {
            total_stiffness_matrix[(free[r], free[c])]
        });
        let known_rhs = DVector::from_fn(free.len(), |r, _| {
            let coupled: f64 = fixed
                .iter()
                .map(|&c| total_stiffness_matrix[(free[r], c)] * displacements[c])
                .sum();
            forces[free[r]] - coupled
        });

        let start = std::time::Instant::now();
        let displacement_solution = match config.method {
            SolverMethod::Cholesky => run_cholesky(&unknown_matrix, &known_rhs)?,
            SolverMethod::ConjugateGradient => {
                // CG cannot tell a semi-definite system apart, so definiteness
                // is checked up front whatever the load
                factorize(&unknown_matrix)?;
                if known_rhs.iter().all(|f| *f == 0.0) {
                    DVector::zeros(free.len())
                } else {
                    run_conjugate_gradient(&unknown_matrix, &known_rhs, config)?.0
                }
            }
        };
        let elapsed = start.elapsed().as_secs_f32();
        info!("solved system in {:.3} seconds", elapsed);

        for (cursor, &dof) in free.iter().enumerate() {
            displacements[dof] = displacement_solution[cursor];
        }
    }

    // Solve for reaction forces
    for &dof in &fixed {
        forces[dof] = (0..displacements.len())
            .map(|col| total_stiffness_matrix[(dof, col)] * displacements[col])
            .sum();
    }

    if displacements.iter().chain(forces.iter()).any(|v| !v.is_finite()) {
        return Err(SingularCause::NonFinite.into());
    }

    Ok((displacements, forces))
}

/// Calculates the constant stress in an element from the nodal displacements
///
/// # Arguments
/// * `element` - The element to target
/// * `nodes` - The model's nodes
/// * `displacements` - Global displacement vector
/// * `material` - The model's material
pub fn compute_stress(
    element: &Element,
    nodes: &[Node],
    displacements: &[f64],
    material: &Material,
) -> Stress {
    let mut nodal_displacements = [0.0; 6];
    for (local, &node) in element.nodes.iter().enumerate() {
        for axis in 0..DOF {
            nodal_displacements[DOF * local + axis] = displacements[DOF * node + axis];
        }
    }
    let displacement_mat: SMatrix<f64, { DOF * 3 }, 1> = SMatrix::from(nodal_displacements);

    let stress = material.stress_strain_matrix()
        * compute_strain_displacement_matrix(
            element,
            nodes,
            compute_element_area(element, nodes),
        )
        * displacement_mat;

    Stress {
        xx: stress[0],
        yy: stress[1],
        xy: stress[2],
    }
}

/// Runs the solver without touching the model
///
/// The mesh must already have passed the model's checks: every element index
/// is valid and no element is degenerate.
///
/// # Arguments
/// * `nodes` - The model's nodes
/// * `elements` - The model's elements
/// * `material` - The model's material
/// * `config` - Solver selection
pub fn run(
    nodes: &[Node],
    elements: &[Element],
    material: &Material,
    config: &SolverConfig,
) -> Result<Solution> {
    debug!("building {} element stiffness matrices", elements.len());
    let element_stiffness_matrices: Vec<SMatrix<f64, 6, 6>> = elements
        .iter()
        .map(|element| compute_element_stiffness_matrix(element, nodes, material))
        .collect();

    debug!("building total stiffness matrix");
    let total_stiffness_matrix =
        build_total_stiffness_matrix(nodes.len(), elements, &element_stiffness_matrices);

    let (displacements, forces) = solve(nodes, &total_stiffness_matrix, config)?;

    let stresses = elements
        .iter()
        .map(|element| compute_stress(element, nodes, &displacements, material))
        .collect();

    Ok(Solution {
        displacements,
        forces,
        stresses,
    })
}
