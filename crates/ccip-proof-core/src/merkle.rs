//! Merkle tree over a committed batch and the multi-proof the off-ramp verifies.
//!
//! Internal nodes hash `INTERNAL_DOMAIN_SEPARATOR ‖ min(a, b) ‖ max(a, b)`.
//! A level with an odd number of nodes is padded with the zero hash before
//! pairing, which is how the committing DON builds the root.

use alloy_primitives::{B256, U256};

use crate::{error::ProofError, keccak256_words, types::CommitReport};

/// `bytes32(uint256(1))`
pub const INTERNAL_DOMAIN_SEPARATOR: [u8; 32] = {
    let mut word = [0u8; 32];
    word[31] = 1;
    word
};

/// Upper bound on `leaves + proofs - 1` accepted by the on-chain verifier.
pub const MAX_NUM_HASHES: usize = 256;

pub fn hash_internal(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    keccak256_words(&[INTERNAL_DOMAIN_SEPARATOR, lo.0, hi.0])
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` are the leaves, the last layer holds the root. Every layer
    /// except the last has even length.
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn new(leaves: Vec<B256>) -> Result<Self, ProofError> {
        if leaves.is_empty() {
            return Err(ProofError::EmptyBatch);
        }

        let mut layers = vec![leaves];
        loop {
            let Some(current) = layers.last_mut() else {
                return Err(ProofError::EmptyBatch);
            };
            if current.len() == 1 {
                break;
            }
            if current.len() % 2 == 1 {
                current.push(B256::ZERO);
            }
            let next = current
                .chunks_exact(2)
                .map(|pair| hash_internal(&pair[0], &pair[1]))
                .collect::<Vec<_>>();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    /// Proves membership of the leaves at `indices` (any order, duplicates ignored).
    ///
    /// Walks the levels bottom-up. Whenever a known node's sibling is also
    /// known the two combine without proof material; otherwise the sibling is
    /// appended to the proof. One flag per hash, in discovery order.
    pub fn prove(&self, indices: &[usize]) -> Result<MultiProof, ProofError> {
        if indices.is_empty() {
            return Err(ProofError::NoTargets);
        }
        let mut known = indices.to_vec();
        known.sort_unstable();
        known.dedup();
        if known.iter().any(|&i| i >= self.layers[0].len()) {
            return Err(ProofError::InvalidProof("leaf index out of range"));
        }

        let mut hashes = Vec::new();
        let mut source_flags = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let mut parents = Vec::with_capacity(known.len());
            let mut j = 0;
            while j < known.len() {
                let index = known[j];
                let sibling = index ^ 1;
                if known.get(j + 1) == Some(&sibling) {
                    source_flags.push(true);
                    j += 2;
                } else {
                    hashes.push(layer[sibling]);
                    source_flags.push(false);
                    j += 1;
                }
                parents.push(index / 2);
            }
            known = parents;
        }

        Ok(MultiProof {
            hashes,
            source_flags,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiProof {
    pub hashes: Vec<B256>,
    /// `true`: combine two already-known values. `false`: consume one proof hash.
    pub source_flags: Vec<bool>,
}

impl MultiProof {
    /// Packs the flags into the verifier's bitfield, bit `i` for hash `i`.
    pub fn flag_bits(&self) -> Result<U256, ProofError> {
        if self.source_flags.len() > MAX_NUM_HASHES {
            return Err(ProofError::ProofTooLarge(self.source_flags.len()));
        }
        let mut bits = U256::ZERO;
        for (i, flag) in self.source_flags.iter().enumerate() {
            if *flag {
                bits.set_bit(i, true);
            }
        }
        Ok(bits)
    }
}

/// Recomputes the root exactly as the off-ramp's `MerkleMultiProof.merkleRoot` does.
///
/// `leaves` must be in tree order. Returns the root the proof commits to;
/// callers compare it against the committed root.
pub fn verify_multi_proof(leaves: &[B256], proofs: &[B256], proof_flag_bits: U256) -> Result<B256, ProofError> {
    if leaves.is_empty() {
        return Err(ProofError::InvalidProof("leaves cannot be empty"));
    }
    if leaves.len() > MAX_NUM_HASHES + 1 || proofs.len() > MAX_NUM_HASHES + 1 {
        return Err(ProofError::ProofTooLarge(leaves.len() + proofs.len()));
    }
    let total_hashes = leaves.len() + proofs.len() - 1;
    if total_hashes > MAX_NUM_HASHES {
        return Err(ProofError::ProofTooLarge(total_hashes));
    }
    if total_hashes == 0 {
        return Ok(leaves[0]);
    }

    let mut hashes = Vec::with_capacity(total_hashes);
    let (mut leaf_pos, mut hash_pos, mut proof_pos) = (0usize, 0usize, 0usize);

    for i in 0..total_hashes {
        let a = next_known(leaves, &hashes, &mut leaf_pos, &mut hash_pos)?;
        let b = if proof_flag_bits.bit(i) {
            next_known(leaves, &hashes, &mut leaf_pos, &mut hash_pos)?
        } else {
            proof_pos += 1;
            *proofs
                .get(proof_pos - 1)
                .ok_or(ProofError::InvalidProof("ran out of proof hashes"))?
        };
        if hash_pos > i {
            return Err(ProofError::InvalidProof("hash consumed before it was computed"));
        }
        hashes.push(hash_internal(&a, &b));
    }

    if hash_pos != total_hashes - 1 || leaf_pos != leaves.len() || proof_pos != proofs.len() {
        return Err(ProofError::InvalidProof("proof did not consume every input"));
    }
    Ok(hashes[total_hashes - 1])
}

/// Next leaf if any remain, otherwise the oldest unconsumed computed hash.
fn next_known(
    leaves: &[B256],
    hashes: &[B256],
    leaf_pos: &mut usize,
    hash_pos: &mut usize,
) -> Result<B256, ProofError> {
    if let Some(leaf) = leaves.get(*leaf_pos) {
        *leaf_pos += 1;
        return Ok(*leaf);
    }
    let hash = hashes
        .get(*hash_pos)
        .copied()
        .ok_or(ProofError::InvalidProof("hash consumed before it was computed"))?;
    *hash_pos += 1;
    Ok(hash)
}

/// A message's position in a committed batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLeaf {
    pub sequence_number: u64,
    pub message_id: B256,
    pub leaf: B256,
}

/// Proof for a subset of a committed batch, ready for an execution report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionProof {
    pub merkle_root: B256,
    pub proofs: Vec<B256>,
    pub proof_flag_bits: U256,
    /// Batch positions of the proven messages, ascending.
    pub indices: Vec<usize>,
}

/// Rebuilds the tree `commit` attests to from the full run
/// `[min_seq_nr, max_seq_nr]`.
///
/// `leaves` must be ascending and cover the interval exactly, and their root
/// must be the committed one. Anything else is an error; a root mismatch is
/// never downgraded.
pub fn committed_tree(leaves: &[BatchLeaf], commit: &CommitReport) -> Result<MerkleTree, ProofError> {
    if leaves.is_empty() {
        return Err(ProofError::EmptyBatch);
    }
    let Some(interval_len) = commit.interval_len() else {
        return Err(ProofError::InvalidInterval {
            min: commit.min_seq_nr,
            max: commit.max_seq_nr,
        });
    };

    let mut expected = commit.min_seq_nr;
    for leaf in leaves {
        if !commit.contains(leaf.sequence_number) {
            return Err(ProofError::UnexpectedLeaf(leaf.sequence_number));
        }
        if leaf.sequence_number != expected {
            return Err(ProofError::IncompleteBatch {
                expected,
                found: Some(leaf.sequence_number),
            });
        }
        expected = expected.saturating_add(1);
    }
    if leaves.len() as u64 != interval_len {
        return Err(ProofError::IncompleteBatch { expected, found: None });
    }

    let tree = MerkleTree::new(leaves.iter().map(|leaf| leaf.leaf).collect())?;
    let computed = tree.root();
    if computed != commit.merkle_root {
        tracing::error!(
            expected_root = %commit.merkle_root,
            %computed,
            min_seq_nr = commit.min_seq_nr,
            max_seq_nr = commit.max_seq_nr,
            "batch does not hash to the committed root"
        );
        return Err(ProofError::RootMismatch {
            expected: commit.merkle_root,
            computed,
        });
    }
    Ok(tree)
}

/// Proves the messages in `targets` against the tree rebuilt by
/// [`committed_tree`].
///
/// The returned proof has already been replayed through [`verify_multi_proof`].
pub fn build_execution_proof(
    leaves: &[BatchLeaf],
    commit: &CommitReport,
    targets: &[B256],
) -> Result<ExecutionProof, ProofError> {
    let tree = committed_tree(leaves, commit)?;

    if targets.is_empty() {
        return Err(ProofError::NoTargets);
    }
    let mut indices = targets
        .iter()
        .map(|id| {
            leaves
                .iter()
                .position(|leaf| leaf.message_id == *id)
                .ok_or(ProofError::MessageNotInBatch(*id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indices.sort_unstable();
    indices.dedup();

    let proof = tree.prove(&indices)?;
    let proof_flag_bits = proof.flag_bits()?;

    let proven = indices.iter().map(|&i| leaves[i].leaf).collect::<Vec<_>>();
    let replayed = verify_multi_proof(&proven, &proof.hashes, proof_flag_bits)?;
    if replayed != commit.merkle_root {
        return Err(ProofError::InvalidProof("proof does not replay to the committed root"));
    }

    tracing::debug!(
        leaves = leaves.len(),
        targets = indices.len(),
        proofs = proof.hashes.len(),
        flags = %format_args!("{proof_flag_bits:#x}"),
        "built execution proof"
    );

    Ok(ExecutionProof {
        merkle_root: commit.merkle_root,
        proofs: proof.hashes,
        proof_flag_bits,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;

    use super::*;
    use crate::{keccak256, types::ChainAddress, u64_to_bytes32};

    fn synthetic_leaf(seq: u64) -> B256 {
        keccak256_words(&[u64_to_bytes32(seq)])
    }

    fn leaves(n: u8) -> Vec<B256> {
        (0..n).map(|i| keccak256(&[i])).collect()
    }

    fn batch(min: u64, n: u64) -> Vec<BatchLeaf> {
        (0..n)
            .map(|i| BatchLeaf {
                sequence_number: min + i,
                message_id: B256::with_last_byte(i as u8 + 1),
                leaf: synthetic_leaf(min + i),
            })
            .collect()
    }

    fn root_of(batch: &[BatchLeaf]) -> B256 {
        MerkleTree::new(batch.iter().map(|l| l.leaf).collect()).unwrap().root()
    }

    fn commit(min_seq_nr: u64, max_seq_nr: u64, merkle_root: B256) -> CommitReport {
        CommitReport {
            merkle_root,
            min_seq_nr,
            max_seq_nr,
            source_chain_selector: 1,
            on_ramp_address: ChainAddress::ZERO,
        }
    }

    #[test]
    fn known_roots() {
        assert_eq!(
            MerkleTree::new(leaves(5)).unwrap().root(),
            b256!("52e2a9eec92e056c95ceb27ccac79c02a6d588cb7c3a90df04ca6f3564212da3")
        );
        let single = MerkleTree::new(leaves(1)).unwrap();
        assert_eq!(
            single.root(),
            b256!("bc36789e7a1e281436464229828f817d6612f7b477d66591ff96a9e064bcc98a")
        );
        assert_eq!(single.root(), leaves(1)[0]);
    }

    #[test]
    fn internal_hash_is_order_independent() {
        let [a, b] = [B256::repeat_byte(1), B256::repeat_byte(2)];
        assert_eq!(hash_internal(&a, &b), hash_internal(&b, &a));
        assert_ne!(hash_internal(&a, &b), keccak256_words(&[[0u8; 32], a.0, b.0]));
    }

    #[test]
    fn proof_shapes() {
        let tree = MerkleTree::new(leaves(5)).unwrap();

        let single = tree.prove(&[2]).unwrap();
        assert_eq!(single.hashes.len(), 3);
        assert_eq!(single.source_flags, vec![false; 3]);
        assert_eq!(single.flag_bits().unwrap(), U256::ZERO);

        let multi = tree.prove(&[4, 0, 1]).unwrap();
        assert_eq!(multi.hashes.len(), 3);
        assert_eq!(multi.source_flags, vec![true, false, false, false, true]);
        assert_eq!(multi.flag_bits().unwrap(), U256::from(17u64));
        // Sibling of leaf 4 is the zero padding.
        assert_eq!(multi.hashes[0], B256::ZERO);
    }

    #[test]
    fn every_subset_verifies() {
        for n in 1..=9u8 {
            let leaves = leaves(n);
            let tree = MerkleTree::new(leaves.clone()).unwrap();
            for mask in 1u32..(1 << n) {
                let subset = (0..n as usize).filter(|i| mask & (1 << i) != 0).collect::<Vec<_>>();
                let proof = tree.prove(&subset).unwrap();
                let proven = subset.iter().map(|&i| leaves[i]).collect::<Vec<_>>();
                let root = verify_multi_proof(&proven, &proof.hashes, proof.flag_bits().unwrap()).unwrap();
                assert_eq!(root, tree.root(), "n={n} subset={subset:?}");
            }
        }
    }

    #[test]
    fn root_is_stable_across_rebuilds() {
        let a = MerkleTree::new(leaves(7)).unwrap().root();
        let b = MerkleTree::new(leaves(7)).unwrap().root();
        assert_eq!(a, b);
    }

    #[test]
    fn single_target_in_five_message_interval() {
        let batch = batch(10, 5);
        let root = root_of(&batch);
        let target = batch[2].message_id;

        let proof = build_execution_proof(&batch, &commit(10, 14, root), &[target]).unwrap();
        assert!(proof.proofs.len() <= 3);
        assert_eq!(proof.indices, vec![2]);
        // One flag per hash: leaves + proofs - 1.
        assert!(proof.proof_flag_bits.bit_len() <= proof.proofs.len());

        let leaf = [batch[2].leaf];
        assert_eq!(verify_multi_proof(&leaf, &proof.proofs, proof.proof_flag_bits).unwrap(), root);

        for i in 0..proof.proofs.len() {
            for byte in 0..32 {
                let mut tampered = proof.proofs.clone();
                tampered[i].0[byte] ^= 0x01;
                let replayed = verify_multi_proof(&leaf, &tampered, proof.proof_flag_bits).unwrap();
                assert_ne!(replayed, root);
            }
        }
    }

    #[test]
    fn rejects_gaps_and_short_runs() {
        let mut gapped = batch(10, 5);
        gapped.remove(3);
        let root = root_of(&gapped);
        assert_eq!(
            build_execution_proof(&gapped, &commit(10, 14, root), &[gapped[0].message_id]),
            Err(ProofError::IncompleteBatch {
                expected: 13,
                found: Some(14),
            })
        );

        let short = batch(10, 4);
        let root = root_of(&short);
        assert_eq!(
            build_execution_proof(&short, &commit(10, 14, root), &[short[0].message_id]),
            Err(ProofError::IncompleteBatch {
                expected: 14,
                found: None,
            })
        );

        let long = batch(10, 6);
        assert_eq!(
            build_execution_proof(&long, &commit(10, 14, root_of(&long)), &[long[0].message_id]),
            Err(ProofError::UnexpectedLeaf(15))
        );
    }

    #[test]
    fn rejects_root_mismatch_by_a_single_bit() {
        let batch = batch(1, 3);
        let mut root = root_of(&batch);
        root.0[31] ^= 1;
        assert!(matches!(
            build_execution_proof(&batch, &commit(1, 3, root), &[batch[0].message_id]),
            Err(ProofError::RootMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unknown_targets() {
        let batch = batch(1, 3);
        let root = root_of(&batch);
        let stranger = B256::repeat_byte(0xee);
        assert_eq!(
            build_execution_proof(&batch, &commit(1, 3, root), &[stranger]),
            Err(ProofError::MessageNotInBatch(stranger))
        );
        assert_eq!(
            build_execution_proof(&batch, &commit(1, 3, root), &[]),
            Err(ProofError::NoTargets)
        );
    }

    #[test]
    fn verifier_rejects_malformed_proofs() {
        let leaves = leaves(4);
        let tree = MerkleTree::new(leaves.clone()).unwrap();
        let proof = tree.prove(&[1]).unwrap();
        let bits = proof.flag_bits().unwrap();

        // Dropping a proof hash still replays, but to a different root.
        let short = verify_multi_proof(&leaves[1..2], &proof.hashes[..1], bits).unwrap();
        assert_ne!(short, tree.root());
        // Claims both inputs are known when only one leaf was supplied.
        assert!(verify_multi_proof(&leaves[1..2], &proof.hashes, U256::from(1u64)).is_err());
        assert!(verify_multi_proof(&[], &[], U256::ZERO).is_err());
    }

    #[test]
    fn committed_tree_checks_the_run_before_the_root() {
        let batch = batch(10, 5);
        let tree = committed_tree(&batch, &commit(10, 14, root_of(&batch))).unwrap();
        assert_eq!(tree.root(), root_of(&batch));

        let wrong_root = B256::repeat_byte(0xee);
        let mut gapped = batch.clone();
        gapped.remove(3);
        assert_eq!(
            committed_tree(&gapped, &commit(10, 14, wrong_root)).map(|tree| tree.root()),
            Err(ProofError::IncompleteBatch {
                expected: 13,
                found: Some(14),
            })
        );
        assert_eq!(
            committed_tree(&batch, &commit(10, 14, wrong_root)).map(|tree| tree.root()),
            Err(ProofError::RootMismatch {
                expected: wrong_root,
                computed: root_of(&batch),
            })
        );
        assert_eq!(
            committed_tree(&batch, &commit(14, 10, root_of(&batch))).map(|tree| tree.root()),
            Err(ProofError::InvalidInterval { min: 14, max: 10 })
        );
        assert_eq!(
            committed_tree(&[], &commit(10, 14, wrong_root)).map(|tree| tree.root()),
            Err(ProofError::EmptyBatch)
        );
    }
}
