//! Static unit prices behind the savings estimates.
//!
//! Monthly on-demand figures in USD. Unknown keys fall back to an explicit
//! default rather than to zero.

/// Monthly price when the instance type is not in the table.
pub const EC2_DEFAULT_MONTHLY: f64 = 35.0;

/// Monthly price when the DB class is not in the table.
pub const RDS_DEFAULT_MONTHLY: f64 = 50.0;

/// Flat estimate for a stopped instance (attached storage keeps billing).
pub const EC2_STOPPED_MONTHLY: f64 = 15.0;

pub const EBS_PER_GB_MONTHLY: f64 = 0.10;
pub const GP2_TO_GP3_PER_GB_MONTHLY: f64 = 0.02;
pub const PIOPS_OVERPROVISIONED_MONTHLY: f64 = 25.0;
pub const SNAPSHOT_PER_GB_MONTHLY: f64 = 0.05;

pub const LAMBDA_UNUSED_MONTHLY: f64 = 5.0;
pub const LAMBDA_HIGH_ERROR_MONTHLY: f64 = 3.0;

pub fn ec2_monthly_cost(instance_type: &str) -> f64 {
    match instance_type {
        "t2.micro" => 8.0,
        "t2.small" => 17.0,
        "t2.medium" => 34.0,
        "t2.large" => 68.0,
        "t3.micro" => 8.0,
        "t3.small" => 15.0,
        "t3.medium" => 30.0,
        "t3.large" => 60.0,
        "m5.large" => 70.0,
        "m5.xlarge" => 140.0,
        "m5.2xlarge" => 280.0,
        "c5.large" => 62.0,
        "c5.xlarge" => 124.0,
        "r5.large" => 92.0,
        "r5.xlarge" => 184.0,
        _ => EC2_DEFAULT_MONTHLY,
    }
}

/// Doubled for multi-AZ deployments (a standby replica bills as a second instance).
pub fn rds_monthly_cost(instance_class: &str, multi_az: bool) -> f64 {
    let base = match instance_class {
        "db.t3.micro" => 15.0,
        "db.t3.small" => 30.0,
        "db.t3.medium" => 60.0,
        "db.t3.large" => 120.0,
        "db.t4g.micro" => 13.0,
        "db.t4g.small" => 26.0,
        "db.t4g.medium" => 52.0,
        "db.m5.large" => 140.0,
        "db.m5.xlarge" => 280.0,
        "db.m5.2xlarge" => 560.0,
        "db.r5.large" => 180.0,
        "db.r5.xlarge" => 360.0,
        _ => RDS_DEFAULT_MONTHLY,
    };
    if multi_az { base * 2.0 } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec2_known_and_default() {
        assert_eq!(ec2_monthly_cost("m5.xlarge"), 140.0);
        assert_eq!(ec2_monthly_cost("x9.mega"), EC2_DEFAULT_MONTHLY);
    }

    #[test]
    fn test_rds_multi_az_doubles() {
        assert_eq!(rds_monthly_cost("db.t3.medium", false), 60.0);
        assert_eq!(rds_monthly_cost("db.t3.medium", true), 120.0);
        assert_eq!(rds_monthly_cost("db.unknown", true), 100.0);
    }
}
