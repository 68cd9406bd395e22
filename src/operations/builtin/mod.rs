pub mod contacts;
pub mod dates;
pub mod docs;
pub mod email;
pub mod images;
pub mod logs;
pub mod markdown;
pub mod media;
pub mod repo;
pub mod sql;
pub mod web;

use std::sync::Arc;

use super::Operation;

/// Every builtin operation, in catalog order.
pub fn all() -> Vec<Arc<dyn Operation>> {
    vec![
        Arc::new(dates::CountWeekday),
        Arc::new(contacts::SortContacts),
        Arc::new(logs::RecentLogs),
        Arc::new(docs::IndexDocs),
        Arc::new(email::ExtractEmailSender),
        Arc::new(images::ExtractCardNumber),
        Arc::new(sql::TicketSales),
        Arc::new(sql::SqlQuery),
        Arc::new(web::FetchUrl),
        Arc::new(web::ScrapeWebsite),
        Arc::new(repo::CloneRepo),
        Arc::new(images::ResizeImage),
        Arc::new(media::TranscribeAudio),
        Arc::new(markdown::ConvertMarkdown),
        Arc::new(markdown::FormatMarkdown),
    ]
}
