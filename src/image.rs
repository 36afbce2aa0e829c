//! Boot image resolution: location aliases first, then the public catalog.

use tracing::{debug, info};

use crate::api::{ApiError, CloudApi, DiskType, ImageRef};
use crate::error::DriverError;

/// Resolves `image` for a volume of `disk_type` in `location`.
///
/// An exact match among the location's image aliases wins. Otherwise the
/// first catalog image whose name contains `image` (case-insensitively), whose
/// family matches the disk type's image family, and which is published in
/// `location` is used.
///
/// # Errors
///
/// Returns [`DriverError::ImageNotFound`] when nothing matches and the
/// classified provider error when the catalog cannot be listed.
pub fn resolve_image<A: CloudApi + ?Sized>(
    api: &A,
    image: &str,
    disk_type: DiskType,
    location: &str,
) -> Result<ImageRef, DriverError> {
    match api.get_location(location) {
        Ok(region) if region.image_aliases.iter().any(|alias| alias == image) => {
            info!(image, location, "using image alias");
            return Ok(ImageRef::Alias(image.to_owned()));
        }
        Ok(_) | Err(ApiError::NotFound { .. }) => {}
        Err(err) => return Err(DriverError::from_api("get location", err)),
    }

    let needle = image.to_lowercase();
    let family = disk_type.image_family();
    let images = api
        .list_images()
        .map_err(|err| DriverError::from_api("list images", err))?;
    debug!(count = images.len(), "searching image catalog");

    images
        .into_iter()
        .find(|candidate| {
            !candidate.name.is_empty()
                && candidate.name.to_lowercase().contains(&needle)
                && candidate.image_type == family.as_str()
                && candidate.location == location
        })
        .map(|found| {
            info!(image = found.name.as_str(), id = found.id.as_str(), "resolved catalog image");
            ImageRef::Id(found.id)
        })
        .ok_or_else(|| DriverError::ImageNotFound {
            name: image.to_owned(),
            location: location.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ImageId;
    use crate::test_support::FakeCloud;
    use rstest::{fixture, rstest};

    #[fixture]
    fn cloud() -> FakeCloud {
        let cloud = FakeCloud::new();
        cloud.seed_location("us/las", &["ubuntu:latest"]);
        cloud.seed_image("img-cd", "Ubuntu-16.04-server.iso", "CDROM", "us/las");
        cloud.seed_image("img-de", "Ubuntu-16.04-20180101", "HDD", "de/fra");
        cloud.seed_image("img-us", "Ubuntu-16.04-20180101", "HDD", "us/las");
        cloud
    }

    #[rstest]
    fn alias_wins_over_catalog(cloud: FakeCloud) {
        let resolved = resolve_image(&cloud, "ubuntu:latest", DiskType::Hdd, "us/las")
            .unwrap_or_else(|err| panic!("resolve: {err}"));
        assert_eq!(resolved, ImageRef::Alias(String::from("ubuntu:latest")));
    }

    #[rstest]
    #[case(DiskType::Hdd)]
    #[case(DiskType::Ssd)]
    fn catalog_match_filters_family_and_location(cloud: FakeCloud, #[case] disk: DiskType) {
        let resolved = resolve_image(&cloud, "ubuntu-16.04", disk, "us/las")
            .unwrap_or_else(|err| panic!("resolve: {err}"));
        assert_eq!(resolved, ImageRef::Id(ImageId::from("img-us")));
    }

    #[rstest]
    fn missing_image_is_reported(cloud: FakeCloud) {
        let err = resolve_image(&cloud, "debian", DiskType::Hdd, "us/las")
            .err()
            .unwrap_or_else(|| panic!("debian should not resolve"));
        assert!(matches!(err, DriverError::ImageNotFound { .. }));
    }

    #[test]
    fn unknown_location_falls_back_to_catalog() {
        let cloud = FakeCloud::new();
        cloud.seed_image("img-1", "CentOS-7", "HDD", "us/ewr");
        let resolved = resolve_image(&cloud, "centos", DiskType::Hdd, "us/ewr")
            .unwrap_or_else(|err| panic!("resolve: {err}"));
        assert_eq!(resolved, ImageRef::Id(ImageId::from("img-1")));
    }
}
