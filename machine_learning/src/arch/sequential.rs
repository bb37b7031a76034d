use ndarray::{Array2, ArrayD, ArrayView2, IxDyn};

use super::{Mode, Model, layers::Layer};
use crate::{
    MlErr, Result, StateDict, initialization::ParamGen, optimization::Optimizer,
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters of every layer live in a single flat buffer, each layer owning the
/// contiguous slice of its size in layer order. The gradient buffer mirrors that layout.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
    mode: Mode,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if two consecutive dense layers don't fit.
    pub fn new<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        Self::validate(&layers)?;

        let size = layers.iter().map(|layer| layer.size()).sum();

        Ok(Self {
            layers,
            params: vec![0.; size],
            grad: vec![0.; size],
            mode: Mode::default(),
        })
    }

    /// Fills the parameters, layer by layer, with values sampled from `param_gen`.
    ///
    /// # Errors
    /// Returns `MlErr::SizeMismatch` if the generator runs out before every parameter is set.
    pub fn init_params<G: ParamGen + ?Sized>(&mut self, param_gen: &mut G) -> Result<()> {
        self.fill_params(|_, n| Ok(param_gen.sample(n)))
    }

    /// Fills the parameters of each layer that has any from its own generator, built by
    /// `param_gen_for` from the layer itself.
    ///
    /// # Errors
    /// Whatever `param_gen_for` fails with, or `MlErr::SizeMismatch` if a generator runs out
    /// before its layer is filled.
    pub fn init_params_with<F, G>(&mut self, mut param_gen_for: F) -> Result<()>
    where
        F: FnMut(&Layer) -> Result<G>,
        G: ParamGen,
    {
        self.fill_params(|layer, n| Ok(param_gen_for(layer)?.sample(n)))
    }

    fn fill_params<F>(&mut self, mut sample: F) -> Result<()>
    where
        F: FnMut(&Layer, usize) -> Result<Option<Vec<f32>>>,
    {
        let mut offset = 0;

        for layer in self.layers.iter().filter(|layer| layer.size() > 0) {
            let size = layer.size();
            let values = sample(layer, size)?.unwrap_or_default();

            if values.len() != size {
                return Err(MlErr::SizeMismatch {
                    what: "generated parameters",
                    got: values.len(),
                    expected: size,
                });
            }

            self.params[offset..offset + size].copy_from_slice(&values);
            offset += size;
        }

        Ok(())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn validate(layers: &[Layer]) -> Result<()> {
        let mut prev_out: Option<usize> = None;

        for (i, layer) in layers.iter().enumerate() {
            let Layer::Dense(dense) = layer else {
                continue;
            };

            let (n, m) = dense.dim();

            if n == 0 || m == 0 {
                return Err(MlErr::InvalidConfig(format!(
                    "layer {i}: dense dimensions must be non zero, got ({n}, {m})"
                )));
            }

            match prev_out {
                Some(prev) if prev != n => {
                    return Err(MlErr::InvalidConfig(format!(
                        "layer {i}: input size ({n}) does not match previous layer output size ({prev})"
                    )));
                }
                _ => {}
            }

            prev_out = Some(m);
        }

        Ok(())
    }

    /// Lists every named parameter tensor with its shape, offset and length in the flat
    /// parameter buffer.
    fn param_layout(&self) -> Vec<(String, Vec<usize>, usize, usize)> {
        let mut layout = Vec::new();
        let mut offset = 0;

        for (i, layer) in self.layers.iter().enumerate() {
            for (name, shape) in layer.param_shapes() {
                let len = shape.iter().product();
                layout.push((format!("layers.{i}.{name}"), shape, offset, len));
                offset += len;
            }
        }

        layout
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let Self {
            layers,
            params,
            mode,
            ..
        } = self;

        let mut out = x.to_owned();
        let mut offset = 0;

        for layer in layers.iter_mut() {
            let size = layer.size();
            out = layer.forward(&params[offset..offset + size], out.view(), *mode)?;
            offset += size;
        }

        Ok(out)
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn backward(&mut self, mut d: Array2<f32>) -> Result<()> {
        let Self {
            layers,
            params,
            grad,
            ..
        } = self;

        let mut end = params.len();

        for layer in layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn step<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&self.grad, &mut self.params)
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn grad(&self) -> &[f32] {
        &self.grad
    }

    fn state_dict(&self) -> Result<StateDict> {
        self.param_layout()
            .into_iter()
            .map(|(name, shape, offset, len)| {
                let data = self.params[offset..offset + len].to_vec();
                let tensor = ArrayD::from_shape_vec(IxDyn(&shape), data)
                    .map_err(|e| MlErr::StateMismatch(format!("{name}: {e}")))?;

                Ok((name, tensor))
            })
            .collect()
    }

    fn check_state_dict(&self, state: &StateDict) -> Result<()> {
        let layout = self.param_layout();

        for (name, shape, ..) in &layout {
            let tensor = state
                .get(name)
                .ok_or_else(|| MlErr::StateMismatch(format!("missing parameter {name}")))?;

            if tensor.shape() != shape.as_slice() {
                return Err(MlErr::StateMismatch(format!(
                    "{name}: expected shape {shape:?}, got {:?}",
                    tensor.shape()
                )));
            }
        }

        if let Some(unexpected) = state
            .keys()
            .find(|key| !layout.iter().any(|(name, ..)| name == *key))
        {
            return Err(MlErr::StateMismatch(format!(
                "unexpected parameter {unexpected}"
            )));
        }

        Ok(())
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        self.check_state_dict(state)?;

        for (name, _, offset, len) in self.param_layout() {
            let dst = &mut self.params[offset..offset + len];

            for (p, &v) in dst.iter_mut().zip(state[&name].iter()) {
                *p = v;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{
        arch::activations::ActFn, initialization::ConstParamGen,
        optimization::GradientDescent,
    };

    fn small() -> Sequential {
        Sequential::new([
            Layer::center(0.5),
            Layer::dense((2, 3), Some(ActFn::relu())),
            Layer::dropout(0.5, 0).unwrap(),
            Layer::dense((3, 2), None),
        ])
        .unwrap()
    }

    #[test]
    fn size_is_the_sum_of_layer_sizes() {
        assert_eq!(small().size(), 3 * 3 + 4 * 2);
    }

    #[test]
    fn incompatible_layers_are_rejected() {
        let res = Sequential::new([Layer::dense((2, 3), None), Layer::dense((4, 1), None)]);
        assert!(matches!(res, Err(MlErr::InvalidConfig(_))));

        let res = Sequential::new([Layer::dense((0, 3), None)]);
        assert!(res.is_err());
    }

    #[test]
    fn init_params_fills_every_layer() {
        let mut model = small();
        let mut param_gen = ConstParamGen::new(0.25, model.size());

        model.init_params(&mut param_gen).unwrap();
        assert!(model.params().iter().all(|&p| p == 0.25));

        let mut short = ConstParamGen::new(0.25, 3);
        assert!(model.init_params(&mut short).is_err());
    }

    #[test]
    fn init_params_with_uses_one_generator_per_layer() {
        let mut model = small();

        model
            .init_params_with(|layer| Ok(ConstParamGen::new(layer.fan_in() as f32, layer.size())))
            .unwrap();

        let (first, second) = model.params().split_at(3 * 3);
        assert!(first.iter().all(|&p| p == 2.));
        assert!(second.iter().all(|&p| p == 3.));

        let res = model.init_params_with(|_| Ok(ConstParamGen::new(0., 1)));
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }

    #[test]
    fn evaluation_forward_is_deterministic() {
        let mut model = small();
        model
            .init_params(&mut ConstParamGen::new(0.1, model.size()))
            .unwrap();
        model.set_mode(Mode::Eval);

        let x = array![[0.9, 0.2], [0.4, 0.7]];
        let a = model.forward(x.view()).unwrap();
        let b = model.forward(x.view()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.dim(), (2, 2));
    }

    #[test]
    fn backward_then_step_moves_against_the_gradient() {
        let mut model = small();
        model
            .init_params(&mut ConstParamGen::new(0.3, model.size()))
            .unwrap();
        model.set_mode(Mode::Eval);

        let x = array![[1.0, 0.8]];
        model.forward(x.view()).unwrap();
        model.zero_grad();
        model.backward(array![[1., -1.]]).unwrap();

        let before = model.params().to_vec();
        let grad = model.grad().to_vec();
        model.step(&mut GradientDescent::new(0.1)).unwrap();

        for ((b, a), g) in before.iter().zip(model.params()).zip(&grad) {
            assert!((a - (b - 0.1 * g)).abs() < 1e-7);
        }
        assert!(grad.iter().any(|&g| g != 0.));
    }

    #[test]
    fn state_dict_round_trips() {
        let mut model = small();
        model
            .init_params(&mut ConstParamGen::new(0.7, model.size()))
            .unwrap();

        let state = model.state_dict().unwrap();
        let names: Vec<_> = state.keys().cloned().collect();
        assert_eq!(
            names,
            ["layers.1.bias", "layers.1.weight", "layers.3.bias", "layers.3.weight"]
        );
        assert_eq!(state["layers.1.weight"].shape(), &[2, 3]);

        let mut other = small();
        other.load_state_dict(&state).unwrap();
        assert_eq!(other.params(), model.params());
    }

    #[test]
    fn strict_loading_rejects_bad_states() {
        let model = small();
        let state = model.state_dict().unwrap();

        let mut missing = state.clone();
        missing.remove("layers.3.bias");
        assert!(small().load_state_dict(&missing).is_err());

        let mut reshaped = state.clone();
        reshaped.insert("layers.3.bias".into(), ArrayD::zeros(IxDyn(&[3])));
        assert!(small().load_state_dict(&reshaped).is_err());

        let mut extra = state;
        extra.insert("layers.9.weight".into(), ArrayD::zeros(IxDyn(&[1])));
        assert!(matches!(
            small().load_state_dict(&extra),
            Err(MlErr::StateMismatch(_))
        ));
    }
}
