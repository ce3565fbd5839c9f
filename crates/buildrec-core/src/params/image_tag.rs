use chrono::{DateTime, Utc};
use rand::Rng;

use super::RAND_DIGITS;
use super::user_params::CommonParams;

/// Platform suffixes appear from this arrangement version on.
const PLATFORM_SUFFIX_ARRANGEMENT: u32 = 4;

/// `{user}/{component}:{target}-{random}-{timestamp}[-{platform}]`.
pub fn make_image_tag<R: Rng + ?Sized>(common: &CommonParams, now: DateTime<Utc>, rng: &mut R) -> String {
    let random: u32 = rng.gen_range(10u32.pow(RAND_DIGITS - 1)..10u32.pow(RAND_DIGITS));
    let mut segments = vec![
        common.koji_target.clone().unwrap_or_else(|| "none".to_string()),
        random.to_string(),
        now.format("%Y%m%d%H%M%S").to_string(),
    ];
    if let Some(platform) = &common.platform {
        if common.arrangement_version.unwrap_or(0) >= PLATFORM_SUFFIX_ARRANGEMENT {
            segments.push(platform.clone());
        }
    }

    format!(
        "{}/{}:{}",
        common.user.as_deref().unwrap_or("None"),
        common.component.as_deref().unwrap_or("None"),
        segments.join("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 10, 11, 15, 23, 44).unwrap()
    }

    fn common() -> CommonParams {
        CommonParams {
            user: Some("mlangsdo".into()),
            component: Some("chromium".into()),
            platform: Some("x86_64".into()),
            ..CommonParams::default()
        }
    }

    fn split(tag: &str) -> Vec<&str> {
        tag.split_once(':').unwrap().1.split('-').collect()
    }

    #[test]
    fn tag_layout() {
        let tag = make_image_tag(&common(), now(), &mut StdRng::seed_from_u64(7));
        assert!(tag.starts_with("mlangsdo/chromium:none-"));
        let segments = split(&tag);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[1].len(), 5);
        assert!(segments[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(segments[2], "20191011152344");
        assert_eq!(segments[3], "x86_64");
    }

    #[test]
    fn old_arrangements_have_no_platform_suffix() {
        let mut common = common();
        common.arrangement_version = Some(3);
        common.koji_target = Some("f30-container".into());
        let tag = make_image_tag(&common, now(), &mut StdRng::seed_from_u64(7));
        let segments: Vec<&str> = tag.split_once(':').unwrap().1.rsplitn(3, '-').collect();
        assert_eq!(segments[0], "20191011152344");
        assert!(tag.contains(":f30-container-"));
    }
}
