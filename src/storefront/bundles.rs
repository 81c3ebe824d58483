use chrono::{DateTime, Duration, Utc};

use crate::model::Bundle;

/// A bundle as configured at startup. Its books come from `theme_query`.
#[derive(Debug, Clone, Copy)]
pub struct BundleDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub discount_percentage: u8,
    pub image_url: &'static str,
    pub theme_query: &'static str,
    pub book_count: u32,
    /// Days the offer runs for, counted from when it is served.
    pub limited_days: Option<i64>,
}

pub const BUNDLES: [BundleDefinition; 3] = [
    BundleDefinition {
        id: "weekly-bundle",
        name: "Weekly Reads Bundle",
        description: "A collection of 5 curated books to enjoy throughout the week. New selection every Monday!",
        discount_percentage: 25,
        image_url: "https://images.unsplash.com/photo-1526374965328-7f61d4dc18c5",
        theme_query: "subject:fiction bestseller -report -proceedings",
        book_count: 5,
        limited_days: None,
    },
    BundleDefinition {
        id: "daily-bundle",
        name: "Daily Inspiration Bundle",
        description: "Get your daily dose of inspiration with this collection of short reads, poetry, and motivational content.",
        discount_percentage: 15,
        image_url: "https://images.unsplash.com/photo-1488590528505-98d2b5aba04b",
        theme_query: "subject:poetry inspiration motivation -report -proceedings",
        book_count: 3,
        limited_days: None,
    },
    BundleDefinition {
        id: "flash-sale-bundle",
        name: "Flash Sale: African Classics",
        description: "Limited time offer! Grab this collection of essential African classics at an incredible discount.",
        discount_percentage: 40,
        image_url: "https://images.unsplash.com/photo-1581091226825-a6a2a5aee158",
        theme_query: "subject:african literature classics -report -proceedings",
        book_count: 4,
        limited_days: Some(7),
    },
];

pub fn find(id: &str) -> Option<&'static BundleDefinition> {
    BUNDLES.iter().find(|def| def.id == id)
}

impl BundleDefinition {
    pub fn to_bundle(&self, now: DateTime<Utc>) -> Bundle {
        let description = match self.limited_days {
            Some(days) => format!(
                "{} Available only until {}!",
                self.description,
                (now + Duration::days(days)).format("%B %-d, %Y")
            ),
            None => self.description.to_string(),
        };
        Bundle {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description,
            discount_percentage: self.discount_percentage,
            image_url: self.image_url.to_string(),
            is_active: true,
            book_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
