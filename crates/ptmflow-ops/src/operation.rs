//! Operations on qudits in Pauli-transfer-matrix form.
//!
//! An [`Operation`] is either a leaf [`PtmOperation`] carrying an explicit
//! PTM, or a [`Chain`] of sub-operations tagged with the qubit slots they act
//! on. Chains are always flat: nested chains are inlined when the chain is
//! built.

use std::collections::BTreeSet;
use std::sync::Arc;

use ndarray::{Array2, ArrayD};
use num_complex::Complex64;
use ptmflow_basis::PauliBasis;
use tracing::trace;

use crate::algebra::{
    generator_from_hamiltonian, generator_from_lindblad_ops, kraus_to_ptm, ptm_convert_basis,
    ptm_from_generator,
};
use crate::compiler::Compiler;
use crate::error::{OpError, OpResult};
use crate::options::CompileOptions;
use crate::state::PauliVector;
use crate::tensor::identity_ptm;

/// A completely-positive map on one or more qudits.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Explicit PTM with per-qubit input and output bases.
    Ptm(PtmOperation),
    /// Ordered sequence of indexed sub-operations.
    Chain(Chain),
}

/// An operation paired with the qubit slots it acts on.
#[derive(Debug, Clone)]
pub struct IndexedOperation {
    /// The wrapped operation.
    pub operation: Operation,
    /// Slot for each of the operation's qubits, in order.
    pub indices: Vec<usize>,
}

/// One operand of [`Operation::from_sequence`].
#[derive(Debug, Clone)]
pub enum SequenceItem {
    /// Applied to slots `0..num_qubits`.
    Plain(Operation),
    /// Applied to explicit slots.
    Indexed(IndexedOperation),
}

impl From<Operation> for SequenceItem {
    fn from(op: Operation) -> Self {
        SequenceItem::Plain(op)
    }
}

impl From<&Operation> for SequenceItem {
    fn from(op: &Operation) -> Self {
        SequenceItem::Plain(op.clone())
    }
}

impl From<IndexedOperation> for SequenceItem {
    fn from(op: IndexedOperation) -> Self {
        SequenceItem::Indexed(op)
    }
}

impl From<PtmOperation> for Operation {
    fn from(op: PtmOperation) -> Self {
        Operation::Ptm(op)
    }
}

impl From<Chain> for Operation {
    fn from(chain: Chain) -> Self {
        Operation::Chain(chain)
    }
}

/// Check a list of bases against an operation's qubit count and dimension.
fn check_bases(
    what: &'static str,
    bases: &[PauliBasis],
    num_qubits: usize,
    dim_hilbert: usize,
) -> OpResult<()> {
    if bases.len() != num_qubits {
        return Err(OpError::ShapeMismatch {
            what,
            expected: vec![num_qubits],
            got: vec![bases.len()],
        });
    }
    for basis in bases {
        if basis.dim_hilbert() != dim_hilbert {
            return Err(OpError::ShapeMismatch {
                what,
                expected: vec![dim_hilbert],
                got: vec![basis.dim_hilbert()],
            });
        }
    }
    Ok(())
}

/// Validate a leaf's basis pair and return the common Hilbert dimension.
fn check_leaf_bases(bases_in: &[PauliBasis], bases_out: &[PauliBasis]) -> OpResult<usize> {
    let first = bases_in.first().ok_or_else(|| {
        OpError::InvalidArgument("an operation needs at least one qubit basis".into())
    })?;
    let dim = first.dim_hilbert();
    check_bases("input bases", bases_in, bases_in.len(), dim)?;
    check_bases("output bases", bases_out, bases_in.len(), dim)?;
    Ok(dim)
}

fn check_slots(indices: &[usize], num_qubits: usize) -> OpResult<()> {
    if indices.len() != num_qubits {
        return Err(OpError::InvalidArgument(format!(
            "operation acts on {num_qubits} qubit(s), got {} index(es)",
            indices.len()
        )));
    }
    for (k, i) in indices.iter().enumerate() {
        if indices[..k].contains(i) {
            return Err(OpError::InvalidArgument(format!(
                "qubit index {i} given more than once"
            )));
        }
    }
    Ok(())
}

/// A leaf operation: a dense PTM with its per-qubit bases.
///
/// The tensor has shape `(out_0, ..., out_{n-1}, in_0, ..., in_{n-1})` where
/// each entry is the `dim_pauli` of the matching basis. The tensor is shared
/// between clones.
/// A single PTM with per-qubit input and output bases.
///
/// The tensor is shared, so clones are cheap.
#[derive(Debug, Clone)]
pub struct PtmOperation {
    ptm: Arc<ArrayD<f64>>,
    bases_in: Vec<PauliBasis>,
    bases_out: Vec<PauliBasis>,
}

impl PtmOperation {
    /// Wrap `ptm`, whose axes are the output then the input Pauli dimensions.
    pub fn new(
        ptm: ArrayD<f64>,
        bases_in: Vec<PauliBasis>,
        bases_out: Vec<PauliBasis>,
    ) -> OpResult<Self> {
        check_leaf_bases(&bases_in, &bases_out)?;
        let expected: Vec<usize> = bases_out
            .iter()
            .chain(&bases_in)
            .map(PauliBasis::dim_pauli)
            .collect();
        if ptm.shape() != expected.as_slice() {
            return Err(OpError::ShapeMismatch {
                what: "PTM",
                expected,
                got: ptm.shape().to_vec(),
            });
        }
        Ok(Self {
            ptm: Arc::new(ptm),
            bases_in,
            bases_out,
        })
    }

    /// The PTM tensor, output axes first.
    pub fn ptm(&self) -> &ArrayD<f64> {
        &self.ptm
    }

    /// Input basis per qubit.
    pub fn bases_in(&self) -> &[PauliBasis] {
        &self.bases_in
    }

    /// Output basis per qubit.
    pub fn bases_out(&self) -> &[PauliBasis] {
        &self.bases_out
    }

    /// Shape of the PTM tensor.
    pub fn shape(&self) -> &[usize] {
        self.ptm.shape()
    }

    /// Number of qubits acted on.
    pub fn num_qubits(&self) -> usize {
        self.bases_in.len()
    }

    /// Hilbert dimension of each qubit.
    pub fn dim_hilbert(&self) -> usize {
        // Non-empty and uniform, checked in `new`.
        self.bases_in[0].dim_hilbert()
    }

    /// Re-express this operation in other bases.
    ///
    /// Returns a cheap clone when nothing changes.
    pub fn with_bases(&self, bases_in: &[PauliBasis], bases_out: &[PauliBasis]) -> OpResult<Self> {
        check_bases("input bases", bases_in, self.num_qubits(), self.dim_hilbert())?;
        check_bases("output bases", bases_out, self.num_qubits(), self.dim_hilbert())?;
        if bases_in == self.bases_in.as_slice() && bases_out == self.bases_out.as_slice() {
            return Ok(self.clone());
        }
        let ptm = ptm_convert_basis(
            &self.ptm,
            &self.bases_in,
            &self.bases_out,
            bases_in,
            bases_out,
        )?;
        Self::new(ptm, bases_in.to_vec(), bases_out.to_vec())
    }

    fn apply<S: PauliVector>(&self, state: &mut S, qubits: &[usize]) -> OpResult<Option<S::Outcome>> {
        let state_bases: Vec<PauliBasis> = qubits
            .iter()
            .map(|&q| state.bases()[q].clone())
            .collect();
        let converted;
        let op = if state_bases != self.bases_in {
            trace!(?qubits, "re-expressing operation in the state's bases");
            converted = self.with_bases(&state_bases, &self.bases_out)?;
            &converted
        } else {
            self
        };
        let outcome = state.apply_ptm(op.ptm.view(), qubits)?;
        for (&q, basis) in qubits.iter().zip(&op.bases_out) {
            state.set_basis(q, basis.clone());
        }
        Ok(outcome)
    }
}

/// A flat sequence of indexed operations over qubits `0..num_qubits`.
#[derive(Debug, Clone)]
pub struct Chain {
    pub(crate) operations: Vec<IndexedOperation>,
    pub(crate) num_qubits: usize,
    pub(crate) dim_hilbert: usize,
}

impl Chain {
    /// Build a chain, inlining nested chains through their index mapping.
    ///
    /// Fails with [`OpError::InvalidChain`] if the referenced qubits are not
    /// exactly `0..n` or an element's index count disagrees with its
    /// operation.
    pub fn new(operations: Vec<IndexedOperation>) -> OpResult<Self> {
        let dim_hilbert = operations
            .first()
            .map(|item| item.operation.dim_hilbert())
            .ok_or_else(|| OpError::InvalidArgument("a chain needs at least one operation".into()))?;

        let mut flat = Vec::with_capacity(operations.len());
        for item in operations {
            if item.operation.dim_hilbert() != dim_hilbert {
                return Err(OpError::InvalidArgument(format!(
                    "operations act on different Hilbert dimensions: {dim_hilbert} and {}",
                    item.operation.dim_hilbert()
                )));
            }
            inline_into(item, &mut flat)?;
        }

        if flat
            .iter()
            .any(|item| matches!(item.operation, Operation::Chain(_)))
        {
            return Err(OpError::InvalidChain(
                "nested chain survived flattening".into(),
            ));
        }

        let used: BTreeSet<usize> = flat
            .iter()
            .flat_map(|item| item.indices.iter().copied())
            .collect();
        let num_qubits = used.len();
        if !used.iter().copied().eq(0..num_qubits) {
            return Err(OpError::InvalidChain(format!(
                "qubit indices must form 0..{num_qubits}, got {used:?}"
            )));
        }

        Ok(Self {
            operations: flat,
            num_qubits,
            dim_hilbert,
        })
    }

    /// Flattened sub-operations in application order.
    pub fn operations(&self) -> &[IndexedOperation] {
        &self.operations
    }

    /// Number of distinct qubits referenced.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Hilbert dimension shared by all sub-operations.
    pub fn dim_hilbert(&self) -> usize {
        self.dim_hilbert
    }

    fn ptm(&self, bases_in: &[PauliBasis], bases_out: &[PauliBasis]) -> OpResult<ArrayD<f64>> {
        let all: Vec<usize> = (0..self.num_qubits).collect();
        let dims: Vec<usize> = bases_in.iter().map(PauliBasis::dim_pauli).collect();
        let identity = PtmOperation::new(identity_ptm(&dims)?, bases_in.to_vec(), bases_in.to_vec())?;
        let mut operations = vec![IndexedOperation {
            operation: identity.into(),
            indices: all.clone(),
        }];
        operations.push(IndexedOperation {
            operation: Operation::Chain(self.clone()),
            indices: all,
        });
        let chain = Chain::new(operations)?;
        match Compiler::new(CompileOptions::reexpress()).compile(
            &chain,
            Some(bases_in),
            Some(bases_out),
        )? {
            Operation::Ptm(op) => Ok(op.ptm().clone()),
            Operation::Chain(_) => Err(OpError::InvalidChain(
                "chain did not reduce to a single operation".into(),
            )),
        }
    }
}

fn inline_into(item: IndexedOperation, out: &mut Vec<IndexedOperation>) -> OpResult<()> {
    let IndexedOperation { operation, indices } = item;
    if indices.len() != operation.num_qubits() {
        return Err(OpError::InvalidChain(format!(
            "operation on {} qubit(s) tagged with {} index(es)",
            operation.num_qubits(),
            indices.len()
        )));
    }
    let distinct: BTreeSet<&usize> = indices.iter().collect();
    if distinct.len() != indices.len() {
        return Err(OpError::InvalidChain(format!(
            "repeated qubit index in {indices:?}"
        )));
    }
    match operation {
        Operation::Chain(inner) => {
            for sub in inner.operations {
                let mapped = sub.indices.iter().map(|&i| indices[i]).collect();
                inline_into(
                    IndexedOperation {
                        operation: sub.operation,
                        indices: mapped,
                    },
                    out,
                )?;
            }
        }
        leaf => out.push(IndexedOperation {
            operation: leaf,
            indices,
        }),
    }
    Ok(())
}

impl Operation {
    /// Wrap a precomputed PTM. `bases_out` defaults to `bases_in`.
    pub fn from_ptm(
        ptm: ArrayD<f64>,
        bases_in: &[PauliBasis],
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Self> {
        let bases_out = bases_out.unwrap_or(bases_in);
        Ok(PtmOperation::new(ptm, bases_in.to_vec(), bases_out.to_vec())?.into())
    }

    /// Build the channel `ρ ↦ Σ_k K_k ρ K_k†`. `bases_out` defaults to
    /// `bases_in`.
    pub fn from_kraus(
        kraus: &[Array2<Complex64>],
        bases_in: &[PauliBasis],
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Self> {
        if kraus.is_empty() {
            return Err(OpError::InvalidArgument(
                "at least one Kraus operator is required".into(),
            ));
        }
        let bases_out = bases_out.unwrap_or(bases_in);
        check_leaf_bases(bases_in, bases_out)?;
        let ptm = kraus_to_ptm(kraus, bases_in, bases_out)?;
        Self::from_ptm(ptm, bases_in, Some(bases_out))
    }

    /// Evolve under a Hamiltonian and/or Lindblad jump operators for `time`.
    ///
    /// The generator is built and exponentiated in `bases_in`; the result is
    /// re-expressed in `bases_out` afterwards if given.
    pub fn from_lindblad_form(
        time: f64,
        bases_in: &[PauliBasis],
        bases_out: Option<&[PauliBasis]>,
        hamiltonian: Option<&Array2<Complex64>>,
        lindblad_ops: Option<&[Array2<Complex64>]>,
    ) -> OpResult<Self> {
        let lindblad_ops = lindblad_ops.filter(|ops| !ops.is_empty());
        let generator = match (hamiltonian, lindblad_ops) {
            (None, None) => {
                return Err(OpError::InvalidArgument(
                    "a Hamiltonian or Lindblad operators are required".into(),
                ));
            }
            (Some(h), None) => generator_from_hamiltonian(h, bases_in)?,
            (None, Some(ops)) => generator_from_lindblad_ops(ops, bases_in)?,
            (Some(h), Some(ops)) => {
                generator_from_hamiltonian(h, bases_in)? + generator_from_lindblad_ops(ops, bases_in)?
            }
        };
        let ptm = ptm_from_generator(&generator, time)?;
        let op = PtmOperation::new(ptm, bases_in.to_vec(), bases_in.to_vec())?;
        match bases_out {
            Some(out) => Ok(op.with_bases(bases_in, out)?.into()),
            None => Ok(op.into()),
        }
    }

    /// Build a chain from plain or indexed operations.
    ///
    /// Plain operations must all act on the same number of qubits and are
    /// placed on `0..n`. Mixing plain and indexed operands is rejected.
    pub fn from_sequence<I>(items: I) -> OpResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<SequenceItem>,
    {
        let items: Vec<SequenceItem> = items.into_iter().map(Into::into).collect();
        let first = items
            .first()
            .ok_or_else(|| OpError::InvalidArgument("specify at least one operation".into()))?;
        let (plain, dim_hilbert, num_qubits) = match first {
            SequenceItem::Plain(op) => (true, op.dim_hilbert(), op.num_qubits()),
            SequenceItem::Indexed(item) => (false, item.operation.dim_hilbert(), 0),
        };

        let mut operations = Vec::with_capacity(items.len());
        for (n, item) in items.into_iter().enumerate() {
            let indexed = match (plain, item) {
                (true, SequenceItem::Plain(operation)) => {
                    if operation.num_qubits() != num_qubits {
                        return Err(OpError::InvalidArgument(format!(
                            "operation number {n} acts on {} qubit(s), expected {num_qubits}; \
                             use `at` to place operations of different sizes",
                            operation.num_qubits()
                        )));
                    }
                    IndexedOperation {
                        operation,
                        indices: (0..num_qubits).collect(),
                    }
                }
                (false, SequenceItem::Indexed(item)) => item,
                (true, SequenceItem::Indexed(_)) => {
                    return Err(OpError::InvalidArgument(format!(
                        "operation number {n} is indexed but operation number 0 is not"
                    )));
                }
                (false, SequenceItem::Plain(_)) => {
                    return Err(OpError::InvalidArgument(format!(
                        "provide indices for operation number {n}"
                    )));
                }
            };
            if indexed.operation.dim_hilbert() != dim_hilbert {
                return Err(OpError::InvalidArgument(format!(
                    "operation number {n} has Hilbert dimension {}, expected {dim_hilbert}",
                    indexed.operation.dim_hilbert()
                )));
            }
            operations.push(indexed);
        }
        Ok(Chain::new(operations)?.into())
    }

    /// Hilbert dimension of each qubit.
    pub fn dim_hilbert(&self) -> usize {
        match self {
            Operation::Ptm(op) => op.dim_hilbert(),
            Operation::Chain(chain) => chain.dim_hilbert,
        }
    }

    /// Number of qubits acted on.
    pub fn num_qubits(&self) -> usize {
        match self {
            Operation::Ptm(op) => op.num_qubits(),
            Operation::Chain(chain) => chain.num_qubits,
        }
    }

    /// The leaf, if this is one.
    pub fn as_ptm(&self) -> Option<&PtmOperation> {
        match self {
            Operation::Ptm(op) => Some(op),
            Operation::Chain(_) => None,
        }
    }

    /// The chain, if this is one.
    pub fn as_chain(&self) -> Option<&Chain> {
        match self {
            Operation::Chain(chain) => Some(chain),
            Operation::Ptm(_) => None,
        }
    }

    /// Tag this operation with the qubit slots it acts on.
    pub fn at(&self, indices: &[usize]) -> OpResult<IndexedOperation> {
        check_slots(indices, self.num_qubits())?;
        Ok(IndexedOperation {
            operation: self.clone(),
            indices: indices.to_vec(),
        })
    }

    /// Equivalent operation in other bases. `None` keeps that side as is.
    ///
    /// Chains are re-expressed by the compiler with optimization disabled.
    pub fn set_bases(
        &self,
        bases_in: Option<&[PauliBasis]>,
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Self> {
        if bases_in.is_none() && bases_out.is_none() {
            return Err(OpError::InvalidArgument(
                "specify bases_in, bases_out or both".into(),
            ));
        }
        self.check_optional_bases(bases_in, bases_out)?;
        match self {
            Operation::Ptm(op) => {
                let bases_in = bases_in.unwrap_or(&op.bases_in);
                let bases_out = bases_out.unwrap_or(&op.bases_out);
                Ok(op.with_bases(bases_in, bases_out)?.into())
            }
            Operation::Chain(chain) => {
                Compiler::new(CompileOptions::reexpress()).compile(chain, bases_in, bases_out)
            }
        }
    }

    /// Dense PTM in the given bases. `bases_out` defaults to `bases_in`.
    pub fn ptm(
        &self,
        bases_in: &[PauliBasis],
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<ArrayD<f64>> {
        let bases_out = bases_out.unwrap_or(bases_in);
        self.check_optional_bases(Some(bases_in), Some(bases_out))?;
        match self {
            Operation::Ptm(op) => Ok(op.with_bases(bases_in, bases_out)?.ptm().clone()),
            Operation::Chain(chain) => chain.ptm(bases_in, bases_out),
        }
    }

    /// Apply in place to `state` on `qubits`.
    ///
    /// A leaf whose input bases differ from the state's current bases on
    /// those qubits is re-expressed first; afterwards the state's bases are
    /// the operation's output bases. Outcomes reported by the state are
    /// collected in order, or `None` if there are none.
    pub fn apply<S: PauliVector>(
        &self,
        state: &mut S,
        qubits: &[usize],
    ) -> OpResult<Option<Vec<S::Outcome>>> {
        check_slots(qubits, self.num_qubits())?;
        let len = state.bases().len();
        if let Some(&q) = qubits.iter().find(|&&q| q >= len) {
            return Err(OpError::IndexOutOfRange {
                what: "state qubits",
                index: q,
                len,
            });
        }
        match self {
            Operation::Ptm(op) => Ok(op.apply(state, qubits)?.map(|outcome| vec![outcome])),
            Operation::Chain(chain) => {
                let mut outcomes = Vec::new();
                for item in &chain.operations {
                    let mapped: Vec<usize> = item.indices.iter().map(|&i| qubits[i]).collect();
                    if let Some(mut out) = item.operation.apply(state, &mapped)? {
                        outcomes.append(&mut out);
                    }
                }
                Ok((!outcomes.is_empty()).then_some(outcomes))
            }
        }
    }

    /// Compile with optimization enabled.
    ///
    /// The result is only valid for states whose bases are subbases of the
    /// bases given here; this is not checked when it is applied.
    pub fn compile(
        &self,
        bases_in: Option<&[PauliBasis]>,
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Self> {
        self.compile_with(CompileOptions::default(), bases_in, bases_out)
    }

    /// Compile with explicit [`CompileOptions`].
    pub fn compile_with(
        &self,
        options: CompileOptions,
        bases_in: Option<&[PauliBasis]>,
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<Self> {
        self.check_optional_bases(bases_in, bases_out)?;
        let wrapped;
        let chain = match self {
            Operation::Chain(chain) => chain,
            Operation::Ptm(_) => {
                let all: Vec<usize> = (0..self.num_qubits()).collect();
                wrapped = Chain::new(vec![self.at(&all)?])?;
                &wrapped
            }
        };
        Compiler::new(options).compile(chain, bases_in, bases_out)
    }

    fn check_optional_bases(
        &self,
        bases_in: Option<&[PauliBasis]>,
        bases_out: Option<&[PauliBasis]>,
    ) -> OpResult<()> {
        let (n, d) = (self.num_qubits(), self.dim_hilbert());
        if let Some(bases) = bases_in {
            check_bases("input bases", bases, n, d)?;
        }
        if let Some(bases) = bases_out {
            check_bases("output bases", bases, n, d)?;
        }
        Ok(())
    }
}
