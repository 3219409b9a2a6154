//! Delta encoder that plans Git-compatible copy/insert instructions
//! between two related buffers and reports a similarity rate the pack
//! writer uses to decide whether the delta is worth keeping.

use diffs::Diff;
#[cfg(feature = "diff_myers")]
use diffs::myers;

use super::utils::write_size_encoding;

const DATA_INS_LEN: usize = 0x7f;

/// Delta operation kind: inline literal data or copy-from-base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Data,
    Copy,
}

/// A single delta op: copy `len` bytes from `begin` in the base, or
/// insert `len` bytes from `begin` in the target.
#[derive(Debug, Clone, Copy)]
struct DeltaOp {
    kind: OpKind,
    begin: usize,
    len: usize,
}

/// Holds the planned ops and similarity stats between two byte slices.
#[derive(Debug)]
pub struct DeltaPlan<'a> {
    ops: Vec<DeltaOp>,
    old_data: &'a [u8],
    new_data: &'a [u8],
    shared: usize,
    shared_rate: f64,
}

impl<'a> DeltaPlan<'a> {
    /// Build a delta plan between two byte slices using myers or
    /// patience (feature gated), collecting copy/insert operations and
    /// similarity stats.
    pub fn new(old_data: &'a [u8], new_data: &'a [u8]) -> Self {
        let mut plan = DeltaPlan {
            ops: vec![],
            old_data,
            new_data,
            shared: 0,
            shared_rate: 0.0,
        };

        #[cfg(feature = "diff_myers")]
        let result = myers::diff(
            &mut plan,
            old_data,
            0,
            old_data.len(),
            new_data,
            0,
            new_data.len(),
        );
        #[cfg(not(feature = "diff_myers"))]
        let result = diffs::patience::diff(
            &mut plan,
            old_data,
            0,
            old_data.len(),
            new_data,
            0,
            new_data.len(),
        );
        // The visitor never fails; the Result is an artifact of the trait.
        result.expect("delta planning cannot fail");

        plan
    }

    /// Encode as a Git delta stream:
    /// `[varint old_size][varint new_size][ops...]` where each op is
    /// either data (msb=0, lower 7 bits = literal length, followed by
    /// literal bytes) or copy (msb=1, flag bits describe which
    /// offset/size bytes are present).
    pub fn encode(&self) -> Vec<u8> {
        let mut result: Vec<u8> = Vec::with_capacity(self.ops.len() * 30);
        result.append(&mut write_size_encoding(self.old_data.len()));
        result.append(&mut write_size_encoding(self.new_data.len()));
        for op in &self.ops {
            result.append(&mut self.encode_op(op));
        }
        result
    }

    fn encode_op(&self, op: &DeltaOp) -> Vec<u8> {
        let mut op_data = vec![];
        match op.kind {
            OpKind::Data => {
                let instruction = (op.len & 0x7f) as u8;
                op_data.push(instruction);
                op_data.extend_from_slice(&self.new_data[op.begin..op.begin + op.len]);
            }
            OpKind::Copy => {
                let mut instruction: u8 = 0x80;
                let mut offset = op.begin;
                let mut size = op.len;
                let mut copy_data = vec![];

                for i in 0..4 {
                    let byte = (offset & 0xff) as u8;
                    if byte != 0 {
                        instruction |= 1 << i;
                        copy_data.push(byte);
                    }
                    offset >>= 8;
                }
                for i in 4..7 {
                    let byte = (size & 0xff) as u8;
                    if byte != 0 {
                        instruction |= 1 << i;
                        copy_data.push(byte);
                    }
                    size >>= 8;
                }

                op_data.push(instruction);
                op_data.append(&mut copy_data);
            }
        }
        op_data
    }

    /// Shared-bytes over target length, computed in `finish`. The pack
    /// writer only keeps deltas whose rate clears its threshold.
    pub fn similarity(&self) -> f64 {
        self.shared_rate
    }
}

impl Diff for DeltaPlan<'_> {
    type Error = ();

    fn equal(&mut self, old: usize, _new: usize, len: usize) -> Result<(), Self::Error> {
        self.shared += len;
        match self.ops.last_mut() {
            Some(tail) if tail.kind == OpKind::Copy && tail.begin + tail.len == old => {
                tail.len += len;
            }
            _ => self.ops.push(DeltaOp {
                kind: OpKind::Copy,
                begin: old,
                len,
            }),
        }
        Ok(())
    }

    fn insert(&mut self, _old: usize, new: usize, len: usize) -> Result<(), ()> {
        let mut len = len;
        let mut new = new;

        if len > DATA_INS_LEN {
            // Literal instructions carry at most 127 bytes each.
            while len > DATA_INS_LEN {
                self.ops.push(DeltaOp {
                    kind: OpKind::Data,
                    begin: new,
                    len: DATA_INS_LEN,
                });
                len -= DATA_INS_LEN;
                new += DATA_INS_LEN;
            }
            self.ops.push(DeltaOp {
                kind: OpKind::Data,
                begin: new,
                len,
            });
            return Ok(());
        }

        match self.ops.last_mut() {
            Some(tail)
                if tail.kind == OpKind::Data
                    && tail.begin + tail.len == new
                    && tail.len + len < DATA_INS_LEN =>
            {
                tail.len += len;
            }
            _ => self.ops.push(DeltaOp {
                kind: OpKind::Data,
                begin: new,
                len,
            }),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        if !self.new_data.is_empty() {
            self.shared_rate = self.shared as f64 / self.new_data.len() as f64;
        }
        Ok(())
    }
}
