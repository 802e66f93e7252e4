//! Candle-based extractive QA reader implementation.
//!
//! Runs a BERT encoder with a SQuAD-style `qa_outputs` head (start/end
//! logits) over a (question, context) pair and proposes literal answer
//! spans from the context.

use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{DevicePreference, ReaderConfig};
use crate::error::{ModelError, ModelResult};
use crate::{ReaderModel, SpanProposal};

/// Maximum answer length in tokens, independent of the char limit.
const MAX_ANSWER_TOKENS: usize = 30;

/// Candle-based extractive QA reader.
pub struct CandleReaderModel {
    model_id: String,
    model: BertModel,
    qa_weight: Tensor,
    qa_bias: Tensor,
    tokenizer: Mutex<Tokenizer>,
    device: Device,
    max_answer_length: usize,
    handle_impossible_answer: bool,
}

impl std::fmt::Debug for CandleReaderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleReaderModel")
            .field("model_id", &self.model_id)
            .finish()
    }
}

unsafe impl Send for CandleReaderModel {}
unsafe impl Sync for CandleReaderModel {}

impl CandleReaderModel {
    /// Create a new Candle reader model.
    pub fn new(config: &ReaderConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();

        if !model_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }

        let config_path = model_path.join("config.json");
        let weights_path = model_path.join("model.safetensors");
        let tokenizer_path = model_path.join("tokenizer.json");

        for (path, name) in [
            (&config_path, "config.json"),
            (&weights_path, "model.safetensors"),
            (&tokenizer_path, "tokenizer.json"),
        ] {
            if !path.exists() {
                return Err(ModelError::model_load(
                    &config.model_id,
                    format!("{} not found", name),
                ));
            }
        }

        info!(
            "Loading reader model '{}' from {:?}",
            config.model_id, model_path
        );

        // Span extraction runs window-by-window with batch size 1; CPU is
        // the reliable default, same rationale as the cross-encoder.
        let device = match config.device {
            DevicePreference::Cpu | DevicePreference::Auto => Device::Cpu,
            DevicePreference::Gpu => Device::Cpu,
        };

        let bert_config: BertConfig = {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        };

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| ModelError::model_load(&config.model_id, e.to_string()))?
        };

        let model = BertModel::load(vb.clone(), &bert_config)
            .map_err(|e| ModelError::model_load(&config.model_id, e.to_string()))?;

        // SQuAD head: two logits (start, end) per token.
        let qa_weight = vb
            .get((2, bert_config.hidden_size), "qa_outputs.weight")
            .map_err(|e| {
                ModelError::model_load(&config.model_id, format!("qa_outputs.weight: {}", e))
            })?;
        let qa_bias = vb.get(2, "qa_outputs.bias").map_err(|e| {
            ModelError::model_load(&config.model_id, format!("qa_outputs.bias: {}", e))
        })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::model_load(&config.model_id, e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: 512,
                ..Default::default()
            }))
            .map_err(|e| ModelError::model_load(&config.model_id, e.to_string()))?;

        info!("Reader model loaded successfully on {:?}", device);

        Ok(Self {
            model_id: config.model_id.clone(),
            model,
            qa_weight,
            qa_bias,
            tokenizer: Mutex::new(tokenizer),
            device,
            max_answer_length: config.max_answer_length,
            handle_impossible_answer: config.handle_impossible_answer,
        })
    }

    /// Forward pass for a single (question, context) pair.
    ///
    /// Returns per-token (start_logit, end_logit) pairs plus the token
    /// bookkeeping needed to map spans back to context characters.
    fn forward_pair(
        &self,
        question: &str,
        context: &str,
    ) -> ModelResult<(Vec<f32>, Vec<f32>, Vec<Option<usize>>, Vec<(usize, usize)>)> {
        let tokenizer = self
            .tokenizer
            .lock()
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;

        let encoding = tokenizer
            .encode((question, context), true)
            .map_err(|e| ModelError::tokenization(e.to_string()))?;

        drop(tokenizer);

        let ids = encoding.get_ids().to_vec();
        let type_ids = encoding.get_type_ids().to_vec();
        let mask = encoding.get_attention_mask().to_vec();
        let sequence_ids: Vec<Option<usize>> = (0..ids.len())
            .map(|i| encoding.token_to_sequence(i))
            .collect();
        let offsets = encoding.get_offsets().to_vec();

        let seq_len = ids.len();
        let input_ids = Tensor::from_vec(ids, (1, seq_len), &self.device)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;
        let token_type_ids = Tensor::from_vec(type_ids, (1, seq_len), &self.device)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;
        let attention_mask = Tensor::from_vec(mask, (1, seq_len), &self.device)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;

        // [1, seq, hidden] -> [seq, hidden] @ [hidden, 2] -> [seq, 2]
        let hidden_size = self
            .qa_weight
            .dim(1)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;
        let flat = hidden
            .reshape((seq_len, hidden_size))
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;
        let weight_t = self
            .qa_weight
            .t()
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;
        let logits = flat
            .matmul(&weight_t)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?
            .broadcast_add(&self.qa_bias)
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;

        let logits: Vec<Vec<f32>> = logits
            .to_vec2()
            .map_err(|e| ModelError::span_extraction_failed(&self.model_id, e.to_string()))?;

        let start_logits: Vec<f32> = logits.iter().map(|row| row[0]).collect();
        let end_logits: Vec<f32> = logits.iter().map(|row| row[1]).collect();

        Ok((start_logits, end_logits, sequence_ids, offsets))
    }
}

/// Softmax over the positions listed in `valid`, zero everywhere else.
fn masked_softmax(logits: &[f32], valid: &[usize]) -> Vec<f32> {
    let mut probs = vec![0.0f32; logits.len()];
    if valid.is_empty() {
        return probs;
    }

    let max = valid
        .iter()
        .map(|&i| logits[i])
        .fold(f32::NEG_INFINITY, f32::max);
    let mut denom = 0.0f32;
    for &i in valid {
        let e = (logits[i] - max).exp();
        probs[i] = e;
        denom += e;
    }
    if denom > 0.0 {
        for &i in valid {
            probs[i] /= denom;
        }
    }
    probs
}

impl ReaderModel for CandleReaderModel {
    fn propose_spans(
        &self,
        question: &str,
        context: &str,
        top_k: usize,
    ) -> ModelResult<Vec<SpanProposal>> {
        if question.trim().is_empty() || context.trim().is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let (start_logits, end_logits, sequence_ids, offsets) =
            self.forward_pair(question, context)?;

        // Only context tokens (sequence 1) are valid answer positions.
        let context_positions: Vec<usize> = sequence_ids
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (*s == Some(1)).then_some(i))
            .collect();

        if context_positions.is_empty() {
            return Ok(vec![]);
        }

        // SQuAD v2 null answer: the CLS position competes in the same
        // distribution as the context tokens, so its probability is
        // directly comparable to span probabilities.
        let valid: Vec<usize> = if self.handle_impossible_answer {
            let mut v = vec![0];
            v.extend(&context_positions);
            v
        } else {
            context_positions.clone()
        };

        let start_probs = masked_softmax(&start_logits, &valid);
        let end_probs = masked_softmax(&end_logits, &valid);

        let null_score = if self.handle_impossible_answer {
            start_probs[0] * end_probs[0]
        } else {
            0.0
        };

        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for &start in &context_positions {
            if start_probs[start] <= 0.0 {
                continue;
            }
            for &end in &context_positions {
                if end < start || end - start >= MAX_ANSWER_TOKENS {
                    continue;
                }
                let score = start_probs[start] * end_probs[end];
                if score > 0.0 {
                    candidates.push((score, start, end));
                }
            }
        }

        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut proposals = Vec::new();
        for (score, start, end) in candidates {
            if proposals.len() >= top_k {
                break;
            }
            if self.handle_impossible_answer && score < null_score {
                continue;
            }

            let (char_start, _) = offsets[start];
            let (_, char_end) = offsets[end];
            if char_end <= char_start || char_end - char_start > self.max_answer_length {
                continue;
            }

            let Some(text) = context.get(char_start..char_end) else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            proposals.push(SpanProposal {
                text: text.to_string(),
                score,
            });
        }

        debug!(
            "Reader proposed {} spans for window of {} chars",
            proposals.len(),
            context.len()
        );

        Ok(proposals)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_softmax_sums_to_one() {
        let logits = vec![1.0, 2.0, 3.0, 4.0];
        let valid = vec![1, 2];
        let probs = masked_softmax(&logits, &valid);

        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[3], 0.0);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1]);
    }

    #[test]
    fn test_masked_softmax_empty_valid() {
        let probs = masked_softmax(&[1.0, 2.0], &[]);
        assert!(probs.iter().all(|&p| p == 0.0));
    }
}
