//! Right-sizing suggestions over ordered size tiers.

pub const EC2_SIZE_TIERS: [&str; 7] = [
    "nano", "micro", "small", "medium", "large", "xlarge", "2xlarge",
];

pub const RDS_SIZE_TIERS: [&str; 7] = [
    "micro", "small", "medium", "large", "xlarge", "2xlarge", "4xlarge",
];

/// Move `steps` tiers down from `size`, clamped at the smallest tier.
/// `None` when `size` is not a known tier.
pub fn step_down(tiers: &[&'static str], size: &str, steps: usize) -> Option<&'static str> {
    let index = tiers.iter().position(|t| *t == size)?;
    Some(tiers[index.saturating_sub(steps)])
}

/// Suggest an EC2 type for the observed average CPU.
///
/// Two tiers down below 5%, one tier down below 10%, unchanged otherwise.
/// Types outside the `family.size` shape or with an unknown size come back
/// unchanged.
pub fn suggest_instance_type(instance_type: &str, cpu_average: f64) -> String {
    let steps = if cpu_average < 5.0 {
        2
    } else if cpu_average < 10.0 {
        1
    } else {
        return instance_type.to_string();
    };

    let Some((family, size)) = instance_type.split_once('.') else {
        return instance_type.to_string();
    };
    match step_down(&EC2_SIZE_TIERS, size, steps) {
        Some(new_size) => format!("{family}.{new_size}"),
        None => instance_type.to_string(),
    }
}

/// Suggest an RDS class (`db.family.size`) for the observed average CPU.
///
/// Two tiers down below 10%, one tier down below 20%, unchanged otherwise.
pub fn suggest_db_class(instance_class: &str, cpu_average: f64) -> String {
    let steps = if cpu_average < 10.0 {
        2
    } else if cpu_average < 20.0 {
        1
    } else {
        return instance_class.to_string();
    };

    let parts: Vec<&str> = instance_class.split('.').collect();
    let [prefix, family, size] = parts.as_slice() else {
        return instance_class.to_string();
    };
    match step_down(&RDS_SIZE_TIERS, size, steps) {
        Some(new_size) => format!("{prefix}.{family}.{new_size}"),
        None => instance_class.to_string(),
    }
}
