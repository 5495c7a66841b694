//! Key/value cache for incremental decoding

/// Cached keys and values of one decoder layer
///
/// Stored per sequence so beams can be reordered without copying the
/// whole batch.
#[derive(Clone, Debug, Default)]
pub struct LayerCache {
    keys: Vec<Vec<f32>>,
    values: Vec<Vec<f32>>,
    len: usize,
}

impl LayerCache {
    /// Append `seq` new positions per sequence and return the full k/v
    ///
    /// `k` and `v` are `batch·seq × kv_width`; the returned tensors are
    /// `batch·(len + seq) × kv_width`.
    pub fn append(
        &mut self,
        k: &[f32],
        v: &[f32],
        batch: usize,
        seq: usize,
        kv_width: usize,
    ) -> (Vec<f32>, Vec<f32>) {
        if self.keys.is_empty() {
            self.keys = vec![Vec::new(); batch];
            self.values = vec![Vec::new(); batch];
        }
        assert_eq!(self.keys.len(), batch, "kv cache batch changed");
        let chunk = seq * kv_width;
        for b in 0..batch {
            self.keys[b].extend_from_slice(&k[b * chunk..(b + 1) * chunk]);
            self.values[b].extend_from_slice(&v[b * chunk..(b + 1) * chunk]);
        }
        self.len += seq;
        (self.keys.concat(), self.values.concat())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn reorder(&mut self, order: &[usize]) {
        self.keys = order.iter().map(|&i| self.keys[i].clone()).collect();
        self.values = order.iter().map(|&i| self.values[i].clone()).collect();
    }
}

/// Key/value cache of the whole decoder
#[derive(Clone, Debug)]
pub struct KvCache {
    layers: Vec<LayerCache>,
}

impl KvCache {
    pub fn new(num_layers: usize) -> Self {
        Self { layers: vec![LayerCache::default(); num_layers] }
    }

    /// Number of cached positions
    pub fn seq_len(&self) -> usize {
        self.layers.first().map_or(0, LayerCache::len)
    }

    pub fn layer_mut(&mut self, idx: usize) -> &mut LayerCache {
        &mut self.layers[idx]
    }

    /// Keep sequence `order[i]` at position `i` (beam search)
    pub fn reorder(&mut self, order: &[usize]) {
        for layer in &mut self.layers {
            layer.reorder(order);
        }
    }
}
