//! Chain compilation.
//!
//! The compiler turns a flat [`Chain`] into as few dense blocks as possible:
//!
//! 1. Every sub-operation is re-expressed so that its input bases match the
//!    bases the previous operations left on its qubits.
//! 2. With optimization enabled, output bases are first narrowed to the
//!    elements an operation can actually populate, then, walking backwards,
//!    to the elements that later operations (or the requested output bases)
//!    actually read.
//! 3. Operations are fused into blocks. An operation whose qubits are all
//!    held by the latest block on those qubits is contracted into it. With
//!    optimization enabled, blocks that a later operation fully covers are
//!    absorbed into that operation.
//! 4. Boundary axes are re-expressed in the requested bases.
//!
//! A single block spanning all qubits is returned as a leaf; otherwise the
//! blocks form a new chain.

use ndarray::{Array2, ArrayD, Axis};
use ptmflow_basis::PauliBasis;
use tracing::{debug, instrument, trace};

use crate::algebra::ptm_convert_basis;
use crate::error::{OpError, OpResult};
use crate::operation::{Chain, IndexedOperation, Operation, PtmOperation};
use crate::options::CompileOptions;
use crate::tensor::{apply_on_axes, identity_ptm, nonzero_indices, reshape};

/// A dense PTM acting on a set of chain qubits.
#[derive(Debug, Clone)]
struct Block {
    ptm: ArrayD<f64>,
    qubits: Vec<usize>,
    bases_in: Vec<PauliBasis>,
    bases_out: Vec<PauliBasis>,
}

impl Block {
    fn position(&self, qubit: usize) -> Option<usize> {
        self.qubits.iter().position(|&q| q == qubit)
    }

    fn reexpress(&mut self, bases_in: Vec<PauliBasis>, bases_out: Vec<PauliBasis>) -> OpResult<()> {
        if bases_in != self.bases_in || bases_out != self.bases_out {
            self.ptm = ptm_convert_basis(
                &self.ptm,
                &self.bases_in,
                &self.bases_out,
                &bases_in,
                &bases_out,
            )?;
            self.bases_in = bases_in;
            self.bases_out = bases_out;
        }
        Ok(())
    }

    /// Keep only `keep` along PTM axis `axis`, narrowing the matching basis.
    fn narrow(&mut self, axis: usize, keep: &[usize]) -> OpResult<()> {
        let k = self.qubits.len();
        let basis = if axis < k {
            &mut self.bases_out[axis]
        } else {
            &mut self.bases_in[axis - k]
        };
        if keep.len() == basis.dim_pauli() {
            return Ok(());
        }
        *basis = basis.subbasis(keep)?;
        self.ptm = self.ptm.select(Axis(axis), keep);
        Ok(())
    }

    fn pauli_size(&self) -> usize {
        self.ptm.len()
    }
}

/// Compose `step` after `block`. The step's qubits must be a subset of the
/// block's, and its input bases must equal the block's output bases there.
fn compose(mut block: Block, step: &Block) -> OpResult<Block> {
    let mut axes = Vec::with_capacity(step.qubits.len());
    for (p, &q) in step.qubits.iter().enumerate() {
        let pos = block.position(q).ok_or_else(|| {
            OpError::InvalidChain(format!("qubit {q} is not held by the target block"))
        })?;
        if block.bases_out[pos] != step.bases_in[p] {
            return Err(OpError::InvalidChain(format!(
                "basis mismatch on qubit {q} between fused operations"
            )));
        }
        axes.push(pos);
    }
    block.ptm = apply_on_axes(block.ptm, &axes, step.ptm.view())?;
    for (p, &pos) in axes.iter().enumerate() {
        block.bases_out[pos] = step.bases_out[p].clone();
    }
    Ok(block)
}

/// Stateless chain compiler.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Compiler using `options`.
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// The options this compiler runs with.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `chain` into an equivalent operation with boundary bases
    /// `bases_in` and `bases_out`.
    ///
    /// Omitted boundary bases default, per qubit, to the input basis of the
    /// first operation touching it and the output basis of the last one.
    #[instrument(
        skip_all,
        fields(
            operations = chain.operations().len(),
            qubits = chain.num_qubits(),
            optimize = self.options.optimize
        )
    )]
    pub fn compile(
        &self,
        chain: &Chain,
        bases_in: Option<&[PauliBasis]>,
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Operation> {
        let mut steps = lower(chain)?;
        let n = chain.num_qubits();
        let target_in = boundary_bases(bases_in, &steps, n, Boundary::Input)?;
        let target_out = boundary_bases(bases_out, &steps, n, Boundary::Output)?;
        for bases in [&target_in, &target_out] {
            if bases.len() != n {
                return Err(OpError::ShapeMismatch {
                    what: "boundary bases",
                    expected: vec![n],
                    got: vec![bases.len()],
                });
            }
            if let Some(b) = bases.iter().find(|b| b.dim_hilbert() != chain.dim_hilbert()) {
                return Err(OpError::ShapeMismatch {
                    what: "boundary basis Hilbert dimension",
                    expected: vec![chain.dim_hilbert()],
                    got: vec![b.dim_hilbert()],
                });
            }
        }

        let size_before: usize = steps.iter().map(Block::pauli_size).sum();
        let current = self.forward(&mut steps, &target_in)?;
        if self.options.optimize {
            self.backward(&mut steps, &current, &target_out)?;
        }
        fix_boundaries(&mut steps, &target_in, &target_out)?;
        let size_after: usize = steps.iter().map(Block::pauli_size).sum();

        let blocks = self.fuse(steps)?;
        debug!(
            blocks = blocks.len(),
            size_before,
            size_after,
            "compiled chain"
        );
        assemble(blocks, n)
    }

    /// Re-express every step's inputs in the bases left by earlier steps.
    /// Returns the bases on every qubit after the last step.
    fn forward(&self, steps: &mut [Block], target_in: &[PauliBasis]) -> OpResult<Vec<PauliBasis>> {
        let mut current = target_in.to_vec();
        for (s, step) in steps.iter_mut().enumerate() {
            let new_in: Vec<PauliBasis> = step.qubits.iter().map(|&q| current[q].clone()).collect();
            let new_out: Vec<PauliBasis> = if self.options.optimize {
                step.bases_out.iter().map(PauliBasis::superbasis).collect()
            } else {
                step.bases_out.clone()
            };
            step.reexpress(new_in, new_out)?;

            if self.options.optimize {
                for p in 0..step.qubits.len() {
                    let keep = nonzero_indices(&step.ptm, p, self.options.tolerance);
                    step.narrow(p, &keep)?;
                }
            }
            for (p, &q) in step.qubits.iter().enumerate() {
                current[q] = step.bases_out[p].clone();
            }
            trace!(step = s, qubits = ?step.qubits, shape = ?step.ptm.shape(), "forward");
        }
        Ok(current)
    }

    /// Drop output elements nothing downstream reads, then input elements the
    /// remaining outputs do not depend on.
    fn backward(
        &self,
        steps: &mut [Block],
        current: &[PauliBasis],
        target_out: &[PauliBasis],
    ) -> OpResult<()> {
        let tol = self.options.tolerance;
        let mut needed: Vec<Vec<usize>> = Vec::with_capacity(current.len());
        for (basis, target) in current.iter().zip(target_out) {
            let overlap = basis.overlap(target)?;
            needed.push(rows_above(&overlap, tol));
        }

        for (s, step) in steps.iter_mut().enumerate().rev() {
            let qubits = step.qubits.clone();
            let k = qubits.len();
            for (p, &q) in qubits.iter().enumerate() {
                step.narrow(p, &needed[q])?;
            }
            for (p, &q) in qubits.iter().enumerate() {
                let keep = nonzero_indices(&step.ptm, k + p, tol);
                step.narrow(k + p, &keep)?;
                needed[q] = keep;
            }
            trace!(step = s, shape = ?step.ptm.shape(), "backward");
        }
        Ok(())
    }

    fn fuse(&self, steps: Vec<Block>) -> OpResult<Vec<Block>> {
        let n = steps
            .iter()
            .flat_map(|s| s.qubits.iter())
            .max()
            .map_or(0, |&q| q + 1);
        let mut blocks: Vec<Option<Block>> = Vec::with_capacity(steps.len());
        let mut last: Vec<Option<usize>> = vec![None; n];

        for step in steps {
            let frontier: Vec<Option<usize>> = step.qubits.iter().map(|&q| last[q]).collect();

            if let Some(b) = containing_block(&blocks, &frontier, &step) {
                let block = take_block(&mut blocks, b)?;
                blocks[b] = Some(compose(block, &step)?);
                continue;
            }

            let mut covered: Vec<usize> = frontier.iter().flatten().copied().collect();
            covered.sort_unstable();
            covered.dedup();
            let absorbable = self.options.optimize
                && !covered.is_empty()
                && covered.iter().all(|&b| {
                    blocks[b].as_ref().is_some_and(|block| {
                        block
                            .qubits
                            .iter()
                            .all(|q| step.qubits.contains(q) && last[*q] == Some(b))
                    })
                });

            let merged = if absorbable {
                let mut absorbed = Vec::with_capacity(covered.len());
                for &b in &covered {
                    absorbed.push(take_block(&mut blocks, b)?);
                }
                absorb(absorbed, &step)?
            } else {
                step
            };
            let index = blocks.len();
            for &q in &merged.qubits {
                last[q] = Some(index);
            }
            blocks.push(Some(merged));
        }
        Ok(blocks.into_iter().flatten().collect())
    }
}

/// The block that holds every qubit of `step` and is the latest on all of
/// them, if there is one.
fn containing_block(
    blocks: &[Option<Block>],
    frontier: &[Option<usize>],
    step: &Block,
) -> Option<usize> {
    let b = (*frontier.first()?)?;
    if frontier.iter().any(|f| *f != Some(b)) {
        return None;
    }
    let block = blocks[b].as_ref()?;
    step.qubits
        .iter()
        .all(|&q| block.position(q).is_some())
        .then_some(b)
}

fn take_block(blocks: &mut [Option<Block>], b: usize) -> OpResult<Block> {
    blocks[b]
        .take()
        .ok_or_else(|| OpError::InvalidChain(format!("block {b} was already fused")))
}

/// Merge `absorbed` blocks, all within the step's qubits, into the step.
fn absorb(absorbed: Vec<Block>, step: &Block) -> OpResult<Block> {
    let mut bases: Vec<PauliBasis> = step.bases_in.clone();
    for block in &absorbed {
        for (p, &q) in block.qubits.iter().enumerate() {
            if let Some(pos) = step.qubits.iter().position(|&s| s == q) {
                bases[pos] = block.bases_in[p].clone();
            }
        }
    }
    let dims: Vec<usize> = bases.iter().map(PauliBasis::dim_pauli).collect();
    let mut acc = Block {
        ptm: identity_ptm(&dims)?,
        qubits: step.qubits.clone(),
        bases_in: bases.clone(),
        bases_out: bases,
    };
    for block in &absorbed {
        acc = compose(acc, block)?;
    }
    compose(acc, step)
}

fn rows_above(m: &Array2<f64>, tolerance: f64) -> Vec<usize> {
    m.rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|x| x.abs() > tolerance))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Input,
    Output,
}

fn lower(chain: &Chain) -> OpResult<Vec<Block>> {
    chain
        .operations()
        .iter()
        .map(|item| match &item.operation {
            Operation::Ptm(op) => Ok(Block {
                ptm: op.ptm().clone(),
                qubits: item.indices.clone(),
                bases_in: op.bases_in().to_vec(),
                bases_out: op.bases_out().to_vec(),
            }),
            Operation::Chain(_) => Err(OpError::InvalidChain(
                "nested chain reached the compiler".into(),
            )),
        })
        .collect()
}

fn boundary_bases(
    given: Option<&[PauliBasis]>,
    steps: &[Block],
    n: usize,
    side: Boundary,
) -> OpResult<Vec<PauliBasis>> {
    if let Some(bases) = given {
        return Ok(bases.to_vec());
    }
    (0..n)
        .map(|q| {
            let found = match side {
                Boundary::Input => steps
                    .iter()
                    .find_map(|s| s.position(q).map(|p| s.bases_in[p].clone())),
                Boundary::Output => steps
                    .iter()
                    .rev()
                    .find_map(|s| s.position(q).map(|p| s.bases_out[p].clone())),
            };
            found.ok_or_else(|| OpError::InvalidChain(format!("qubit {q} is not used")))
        })
        .collect()
}

/// Re-express the first input and last output on every qubit in the
/// requested boundary bases.
fn fix_boundaries(
    steps: &mut [Block],
    target_in: &[PauliBasis],
    target_out: &[PauliBasis],
) -> OpResult<()> {
    let mut seen = vec![false; target_in.len()];
    for step in steps.iter_mut() {
        let mut bases_in = step.bases_in.clone();
        for (p, &q) in step.qubits.iter().enumerate() {
            if !seen[q] {
                bases_in[p] = target_in[q].clone();
                seen[q] = true;
            }
        }
        let bases_out = step.bases_out.clone();
        step.reexpress(bases_in, bases_out)?;
    }

    seen.fill(false);
    for step in steps.iter_mut().rev() {
        let mut bases_out = step.bases_out.clone();
        for (p, &q) in step.qubits.iter().enumerate() {
            if !seen[q] {
                bases_out[p] = target_out[q].clone();
                seen[q] = true;
            }
        }
        let bases_in = step.bases_in.clone();
        step.reexpress(bases_in, bases_out)?;
    }
    Ok(())
}

fn assemble(blocks: Vec<Block>, n: usize) -> OpResult<Operation> {
    if let [block] = blocks.as_slice() {
        if block.qubits.len() == n {
            let k = block.qubits.len();
            let mut order: Vec<usize> = (0..k).collect();
            order.sort_by_key(|&p| block.qubits[p]);
            let perm: Vec<usize> = order.iter().copied().chain(order.iter().map(|p| p + k)).collect();
            let shape: Vec<usize> = perm.iter().map(|&a| block.ptm.shape()[a]).collect();
            let ptm = reshape(block.ptm.clone().permuted_axes(perm), &shape)?;
            let bases_in = order.iter().map(|&p| block.bases_in[p].clone()).collect();
            let bases_out = order.iter().map(|&p| block.bases_out[p].clone()).collect();
            return Ok(PtmOperation::new(ptm, bases_in, bases_out)?.into());
        }
    }
    let operations = blocks
        .into_iter()
        .map(|block| {
            Ok(IndexedOperation {
                operation: PtmOperation::new(block.ptm, block.bases_in, block.bases_out)?.into(),
                indices: block.qubits,
            })
        })
        .collect::<OpResult<Vec<_>>>()?;
    Ok(Chain::new(operations)?.into())
}
