//! Field constraints on ingested entities, enforced at construction time.

use crate::models::{Batch, Product};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("price must be non-negative, got {0}")]
    NegativePrice(f64),

    #[error("rating must be within [0, 5], got {0}")]
    RatingOutOfRange(f64),

    #[error("review_count must be non-negative, got {0}")]
    NegativeReviewCount(i64),

    #[error("batch_size {size} exceeds MAX_BATCH_SIZE {max}")]
    BatchTooLarge { size: i64, max: usize },
}

pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    if let Some(price) = product.price {
        if price < 0.0 {
            return Err(ValidationError::NegativePrice(price));
        }
    }
    if let Some(rating) = product.rating {
        if !(0.0..=5.0).contains(&rating) {
            return Err(ValidationError::RatingOutOfRange(rating));
        }
    }
    if let Some(review_count) = product.review_count {
        if review_count < 0 {
            return Err(ValidationError::NegativeReviewCount(review_count));
        }
    }
    Ok(())
}

pub fn validate_batch(batch: &Batch, max_batch_size: usize) -> Result<(), ValidationError> {
    if batch.batch_size as usize > max_batch_size {
        return Err(ValidationError::BatchTooLarge {
            size: batch.batch_size,
            max: max_batch_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_product() -> Product {
        Product {
            id: "amzn_X".into(),
            url_id: "u1".into(),
            title: None,
            price: Some(10.0),
            category: None,
            gender: None,
            url: "https://example.com/p".into(),
            image_url: None,
            colors: vec![],
            sizes: vec![],
            material: None,
            description: None,
            rating: Some(4.0),
            review_count: Some(5),
            processed: false,
            scraped_at: Utc::now(),
            processed_at: None,
            page_index: 0,
            page_content: None,
        }
    }

    #[test]
    fn rejects_negative_price() {
        let mut p = sample_product();
        p.price = Some(-1.0);
        assert!(validate_product(&p).is_err());
    }

    #[test]
    fn rejects_rating_above_five() {
        let mut p = sample_product();
        p.rating = Some(5.5);
        assert!(validate_product(&p).is_err());
    }

    #[test]
    fn accepts_valid_product() {
        assert!(validate_product(&sample_product()).is_ok());
    }
}
