//! Catalog domain module: reusable articles a business invoices for.

pub mod article;

pub use article::{Article, ArticleDraft, ArticlePatch, ArticleRecord};
