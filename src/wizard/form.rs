use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::ingest::ImageFile;
use crate::models::{DimensionUnit, Dimensions, Edition, NewArtwork};
use crate::storage::{self, PRIMARY_IMAGE_FIELD};

pub const TITLE_FIELD: &str = "title";
pub const YEAR_FIELD: &str = "year";
pub const MEDIUM_FIELD: &str = "medium";
pub const HEIGHT_FIELD: &str = "height";
pub const WIDTH_FIELD: &str = "width";
pub const DEPTH_FIELD: &str = "depth";
pub const DESCRIPTION_FIELD: &str = "description";
pub const EDITION_NUMBER_FIELD: &str = "editionNumber";
pub const EDITION_SIZE_FIELD: &str = "editionSize";

const TITLE_CHARS: (usize, usize) = (2, 120);
const MEDIUM_CHARS: (usize, usize) = (2, 80);
const DESCRIPTION_CHARS: (usize, usize) = (280, 500);
const MAX_EDITION_SIZE: u32 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionType {
    #[default]
    Unique,
    Editioned,
}

/// Raw registration form input, kept as typed so partially filled drafts
/// can be held and autosaved.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkForm {
    pub title: String,
    pub artist: String,
    pub year: String,
    pub medium: String,
    pub height: String,
    pub width: String,
    pub depth: String,
    pub unit: DimensionUnit,
    pub description: String,
    pub edition_type: EditionType,
    pub edition_number: String,
    pub edition_size: String,
    pub is_public: bool,
    pub primary_image: Option<ImageFile>,
}

impl Default for ArtworkForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            year: String::new(),
            medium: String::new(),
            height: String::new(),
            width: String::new(),
            depth: String::new(),
            unit: DimensionUnit::Inches,
            description: String::new(),
            edition_type: EditionType::Unique,
            edition_number: String::new(),
            edition_size: String::new(),
            is_public: true,
            primary_image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedForm {
    pub artwork: NewArtwork,
    pub image: ImageFile,
}

impl ArtworkForm {
    /// Runs every field rule and reports all failures at once.
    pub fn validate(
        &self,
        current_year: i32,
        max_image_bytes: usize,
    ) -> Result<ValidatedForm, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = self.title.trim();
        check_length(&mut errors, TITLE_FIELD, "Title", title, TITLE_CHARS);

        let year = match self.year.trim() {
            "" => {
                errors.add(YEAR_FIELD, "Year is required");
                None
            }
            raw => match raw.parse::<i32>() {
                Ok(year) if year > current_year => {
                    errors.add(YEAR_FIELD, format!("Year cannot be later than {current_year}"));
                    None
                }
                Ok(year) => Some(year),
                Err(_) => {
                    errors.add(YEAR_FIELD, "Year must be a number");
                    None
                }
            },
        };

        let medium = self.medium.trim();
        check_length(&mut errors, MEDIUM_FIELD, "Medium", medium, MEDIUM_CHARS);

        let height = required_positive(&mut errors, HEIGHT_FIELD, "Height", &self.height);
        let width = required_positive(&mut errors, WIDTH_FIELD, "Width", &self.width);
        let depth = if self.depth.trim().is_empty() {
            None
        } else {
            required_positive(&mut errors, DEPTH_FIELD, "Depth", &self.depth)
        };

        let description = self.description.trim();
        if !description.is_empty() {
            check_length(
                &mut errors,
                DESCRIPTION_FIELD,
                "Description",
                description,
                DESCRIPTION_CHARS,
            );
        }

        let edition = match self.edition_type {
            EditionType::Unique => Some(Edition::Unique),
            EditionType::Editioned => self.validate_edition(&mut errors),
        };

        let image = match &self.primary_image {
            None => {
                errors.add(PRIMARY_IMAGE_FIELD, "A primary image is required");
                None
            }
            Some(image) => match storage::validate_artwork_image(image, max_image_bytes) {
                Ok(_) => Some(image.clone()),
                Err(image_errors) => {
                    if let Some(message) = image_errors.get(PRIMARY_IMAGE_FIELD) {
                        errors.add(PRIMARY_IMAGE_FIELD, message);
                    }
                    None
                }
            },
        };

        match (year, height, width, edition, image) {
            (Some(year), Some(height), Some(width), Some(edition), Some(image))
                if errors.is_empty() =>
            {
                let artist = self.artist.trim();
                Ok(ValidatedForm {
                    artwork: NewArtwork {
                        title: title.to_string(),
                        artist: (!artist.is_empty()).then(|| artist.to_string()),
                        year,
                        medium: medium.to_string(),
                        dimensions: Dimensions {
                            height,
                            width,
                            depth,
                            unit: self.unit,
                        },
                        description: (!description.is_empty()).then(|| description.to_string()),
                        edition,
                        is_public: self.is_public,
                    },
                    image,
                })
            }
            _ => Err(errors),
        }
    }

    fn validate_edition(&self, errors: &mut ValidationErrors) -> Option<Edition> {
        let size = match self.edition_size.trim().parse::<u32>() {
            Ok(size) if (1..=MAX_EDITION_SIZE).contains(&size) => Some(size),
            Ok(_) => {
                errors.add(
                    EDITION_SIZE_FIELD,
                    format!("Edition size must be between 1 and {MAX_EDITION_SIZE}"),
                );
                None
            }
            Err(_) if self.edition_size.trim().is_empty() => {
                errors.add(EDITION_SIZE_FIELD, "Edition size is required");
                None
            }
            Err(_) => {
                errors.add(EDITION_SIZE_FIELD, "Edition size must be a whole number");
                None
            }
        };

        let number = match self.edition_number.trim().parse::<u32>() {
            Ok(number) if number >= 1 && size.map_or(true, |size| number <= size) => Some(number),
            Ok(_) => {
                errors.add(
                    EDITION_NUMBER_FIELD,
                    "Edition number must be between 1 and the edition size",
                );
                None
            }
            Err(_) if self.edition_number.trim().is_empty() => {
                errors.add(EDITION_NUMBER_FIELD, "Edition number is required");
                None
            }
            Err(_) => {
                errors.add(EDITION_NUMBER_FIELD, "Edition number must be a whole number");
                None
            }
        };

        Some(Edition::Editioned {
            number: number?,
            size: size?,
        })
    }
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: &str,
    (min, max): (usize, usize),
) {
    let count = value.chars().count();
    if count == 0 {
        errors.add(field, format!("{label} is required"));
    } else if count < min || count > max {
        errors.add(
            field,
            format!("{label} must be between {min} and {max} characters"),
        );
    }
}

fn required_positive(errors: &mut ValidationErrors, field: &str, label: &str, raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add(field, format!("{label} is required"));
        return None;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            errors.add(field, format!("{label} must be a positive number"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::png_of_size;

    const MAX: usize = 10 * 1024 * 1024;

    fn seascape() -> ArtworkForm {
        ArtworkForm {
            title: "Seascape".to_string(),
            year: "2024".to_string(),
            medium: "Oil".to_string(),
            height: "10".to_string(),
            width: "12".to_string(),
            unit: DimensionUnit::Inches,
            ..ArtworkForm::default()
        }
    }

    #[test]
    fn missing_image_is_the_only_error() {
        let errors = seascape().validate(2025, MAX).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains(PRIMARY_IMAGE_FIELD));
    }

    #[test]
    fn png_image_completes_the_form() {
        let mut form = seascape();
        form.primary_image = Some(png_of_size(2 * 1024 * 1024));
        let validated = form.validate(2025, MAX).unwrap();
        assert_eq!(validated.artwork.title, "Seascape");
        assert_eq!(validated.artwork.year, 2024);
        assert_eq!(validated.artwork.dimensions.height, 10.0);
        assert_eq!(validated.artwork.dimensions.width, 12.0);
        assert_eq!(validated.artwork.edition, Edition::Unique);
        assert_eq!(validated.artwork.artist, None);
    }

    #[test]
    fn field_rules_report_every_failure() {
        let form = ArtworkForm {
            title: "A".to_string(),
            year: "2999".to_string(),
            medium: "x".repeat(81),
            height: "-3".to_string(),
            width: "wide".to_string(),
            depth: "0".to_string(),
            description: "too short".to_string(),
            ..ArtworkForm::default()
        };
        let errors = form.validate(2025, MAX).unwrap_err();
        for field in [
            TITLE_FIELD,
            YEAR_FIELD,
            MEDIUM_FIELD,
            HEIGHT_FIELD,
            WIDTH_FIELD,
            DEPTH_FIELD,
            DESCRIPTION_FIELD,
            PRIMARY_IMAGE_FIELD,
        ] {
            assert!(errors.contains(field), "expected error for {field}: {errors}");
        }
        assert_eq!(errors.get(YEAR_FIELD), Some("Year cannot be later than 2025"));
    }

    #[test]
    fn year_must_be_numeric() {
        let mut form = seascape();
        form.year = "last spring".to_string();
        let errors = form.validate(2025, MAX).unwrap_err();
        assert_eq!(errors.get(YEAR_FIELD), Some("Year must be a number"));
    }

    #[test]
    fn description_length_window() {
        let mut form = seascape();
        form.primary_image = Some(png_of_size(128));
        form.description = "d".repeat(280);
        assert!(form.validate(2025, MAX).is_ok());
        form.description = "d".repeat(501);
        assert!(form.validate(2025, MAX).unwrap_err().contains(DESCRIPTION_FIELD));
    }

    #[test]
    fn editions_are_range_checked() {
        let mut form = seascape();
        form.primary_image = Some(png_of_size(128));
        form.edition_type = EditionType::Editioned;

        let errors = form.validate(2025, MAX).unwrap_err();
        assert!(errors.contains(EDITION_NUMBER_FIELD));
        assert!(errors.contains(EDITION_SIZE_FIELD));

        form.edition_number = "12".to_string();
        form.edition_size = "10".to_string();
        let errors = form.validate(2025, MAX).unwrap_err();
        assert!(errors.contains(EDITION_NUMBER_FIELD));
        assert!(!errors.contains(EDITION_SIZE_FIELD));

        form.edition_number = "3".to_string();
        let validated = form.validate(2025, MAX).unwrap();
        assert_eq!(validated.artwork.edition, Edition::Editioned { number: 3, size: 10 });
    }

    #[test]
    fn oversized_image_is_a_field_error() {
        let mut form = seascape();
        form.primary_image = Some(png_of_size(MAX + 1));
        let errors = form.validate(2025, MAX).unwrap_err();
        assert!(errors.get(PRIMARY_IMAGE_FIELD).unwrap().contains("MB"));
    }
}
