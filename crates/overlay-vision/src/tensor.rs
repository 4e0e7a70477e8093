use crate::{RawDetection, Result, VisionError};

/// Turn the detector's box tensor (`[count, 4]` or `[1, count, 4]`, rows of
/// cx, cy, w, h in inference pixels) and label-id tensor into detections.
pub fn decode_detections(boxes: &[f32], box_shape: &[usize], label_ids: &[i32]) -> Result<Vec<RawDetection>> {
    let (count, stride) = match box_shape {
        [1, n, s] => (*n, *s),
        [n, s] => (*n, *s),
        other => return Err(VisionError::invalid(format!("unexpected box tensor dims {:?}", other))),
    };
    if stride != 4 {
        return Err(VisionError::invalid(format!("box tensor stride {} (expected 4), dims {:?}", stride, box_shape)));
    }
    let need = count
        .checked_mul(stride)
        .ok_or_else(|| VisionError::invalid(format!("box tensor dims {:?} overflow", box_shape)))?;
    if boxes.len() != need {
        return Err(VisionError::invalid(format!("box tensor holds {} values, dims {:?} need {}", boxes.len(), box_shape, need)));
    }
    if label_ids.len() < count {
        return Err(VisionError::invalid(format!("{} label ids for {} boxes", label_ids.len(), count)));
    }

    Ok(boxes
        .chunks_exact(4)
        .zip(label_ids)
        .map(|(b, &id)| RawDetection::new(b[0], b[1], b[2], b[3], id))
        .collect())
}
