use anyhow::Error;

pub fn u8_to_f32_vec(v: &[u8]) -> Result<Vec<f32>, Error> {
    if v.len() % 4 != 0 {
        return Err(Error::msg(format!("raw tensor length {} is not a multiple of 4", v.len())))
    }
    Ok(v.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
