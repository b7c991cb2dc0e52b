//! Locator tables for the booking site.
//!
//! All "what to try" knowledge lives here as data. When the markup drifts,
//! add a row to the relevant chain (or override it from the config file);
//! the resolution and commit loops never change.

use serde::{Deserialize, Serialize};

use crate::extractor::FieldChains;
use crate::locator::{AttrOp, LocatorChain};
use crate::pagination::PaginationLocators;

/// Every locator chain the flows use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLocators {
    /// Announcement dialog shown on arrival
    pub notice_dismiss: LocatorChain,
    /// National ID input
    pub id_input: LocatorChain,
    /// Password input
    pub password_input: LocatorChain,
    /// Login button
    pub login_submit: LocatorChain,
    /// "Login succeeded" dialog confirmation
    pub login_confirm: LocatorChain,
    /// Entry point of a new booking
    pub booking_entry: LocatorChain,
    /// Unlabeled choice controls on the booking form
    pub form_controls: LocatorChain,
    /// Pickup address search box
    pub pickup_search: LocatorChain,
    /// First autocomplete suggestion under the search box
    pub search_suggestion: LocatorChain,
    /// "Next, confirm booking details"
    pub confirm_step: LocatorChain,
    /// "Submit booking"
    pub submit: LocatorChain,
    /// "Booking completed" marker
    pub completion: LocatorChain,
    /// Link to the order list
    pub order_list_entry: LocatorChain,
    /// Order list container, records and "next" control
    pub pagination: PaginationLocators,
    /// Status badges inside a record
    pub status_markers: LocatorChain,
    /// Vehicle/driver sub-elements that corroborate a recent record
    pub evidence: LocatorChain,
    /// Per-field chains inside a record
    pub fields: FieldChains,
}

impl Default for SiteLocators {
    fn default() -> Self {
        Self {
            notice_dismiss: LocatorChain::new("notice_dismiss")
                .text_eq("button", "我知道了")
                .text_contains("a, span, div[role='button']", "我知道了"),
            id_input: LocatorChain::new("id_input")
                .css("#idno")
                .css("#username")
                .attr("input", "placeholder", AttrOp::Contains, "身分證")
                .attr("input", "name", AttrOp::Contains, "id")
                .css("form input[type='text']"),
            password_input: LocatorChain::new("password_input")
                .css("#password")
                .css("input[type='password']"),
            login_submit: LocatorChain::new("login_submit")
                .text_eq("button", "民眾登入")
                .attr("input", "value", AttrOp::Equals, "民眾登入")
                .text_contains("a", "民眾登入")
                .attr("input", "value", AttrOp::Contains, "登入")
                .css("#login-btn")
                .css("#loginBtn")
                .css("#login"),
            login_confirm: LocatorChain::new("login_confirm")
                .text_eq(".modal button, [role='dialog'] button, .swal-modal button", "確定")
                .text_eq("button", "確定"),
            booking_entry: LocatorChain::new("booking_entry")
                .text_eq("a", "新增預約")
                .text_eq("button", "新增預約")
                .text_contains("a, button, span", "新增預約"),
            form_controls: LocatorChain::new("form_controls")
                .css("form select")
                .css("select"),
            pickup_search: LocatorChain::new("pickup_search")
                .attr("input", "placeholder", AttrOp::Contains, "上車")
                .attr("input", "placeholder", AttrOp::Contains, "起點")
                .attr("input", "placeholder", AttrOp::Contains, "地點")
                .css("#pickup-location")
                .css("#origin"),
            search_suggestion: LocatorChain::new("search_suggestion")
                .css(".pac-container .pac-item")
                .css(".pac-item")
                .css("[role='listbox'] [role='option']"),
            confirm_step: LocatorChain::new("confirm_step")
                .text_eq("button", "下一步，確認預約資訊")
                .text_contains("button, a", "確認預約資訊")
                .text_contains("button", "下一步"),
            submit: LocatorChain::new("submit")
                .text_eq("button", "送出預約")
                .text_contains("button, a, input", "送出預約"),
            completion: LocatorChain::new("completion")
                .text_contains("h1, h2, h3, .title", "已完成預約")
                .text_contains("div, p, span", "已完成預約"),
            order_list_entry: LocatorChain::new("order_list_entry")
                .text_contains("a, button", "預約紀錄")
                .text_contains("a, button", "訂單查詢")
                .text_contains("a, button", "派車結果"),
            pagination: PaginationLocators {
                container: LocatorChain::new("order_container")
                    .css(".order-list")
                    .css("#orders")
                    .css("table.orders tbody"),
                records: LocatorChain::new("order_records")
                    .css(".order-list .order-item")
                    .css("#orders .order")
                    .css("table.orders tbody tr"),
                next: LocatorChain::new("next_page")
                    .text_eq("button", "下一頁")
                    .text_eq("a", "下一頁")
                    .css(".pagination .next")
                    .attr("button", "aria-label", AttrOp::Equals, "Next"),
            },
            status_markers: LocatorChain::new("status_markers")
                .css(".status")
                .css(".badge")
                .css("[class*='status']"),
            evidence: LocatorChain::new("evidence")
                .css(".car-no")
                .css(".vehicle")
                .css(".driver")
                .css("[class*='dispatch']"),
            fields: FieldChains {
                date_time: LocatorChain::new("date_time")
                    .css(".date-time")
                    .css(".time")
                    .css("[class*='date']"),
                vehicle_number: LocatorChain::new("vehicle_number")
                    .css(".car-no")
                    .css(".vehicle")
                    .text_contains("span, td", "車號"),
                driver_info: LocatorChain::new("driver_info")
                    .css(".driver")
                    .text_contains("span, td", "司機"),
                fee_text: LocatorChain::new("fee_text")
                    .css(".fee")
                    .css(".amount")
                    .css("[class*='fee']")
                    .text_contains("span, td", "元"),
            },
        }
    }
}

impl SiteLocators {
    /// Scope of one yes/no question, found by its prompt text
    #[must_use]
    pub fn question(prompt: &str) -> LocatorChain {
        LocatorChain::new(format!("question:{prompt}"))
            .text_contains(".form-group", prompt)
            .text_contains("fieldset", prompt)
            .text_contains("li", prompt)
    }

    /// An answer control inside a question scope
    #[must_use]
    pub fn answer(answer: &str) -> LocatorChain {
        LocatorChain::new(format!("answer:{answer}"))
            .text_eq("label", answer)
            .text_eq("button", answer)
            .attr("input[type='radio']", "value", AttrOp::Equals, answer)
            .text_eq("span", answer)
    }

    /// Every chain, for validation
    #[must_use]
    pub fn chains(&self) -> Vec<&LocatorChain> {
        vec![
            &self.notice_dismiss,
            &self.id_input,
            &self.password_input,
            &self.login_submit,
            &self.login_confirm,
            &self.booking_entry,
            &self.form_controls,
            &self.pickup_search,
            &self.search_suggestion,
            &self.confirm_step,
            &self.submit,
            &self.completion,
            &self.order_list_entry,
            &self.pagination.container,
            &self.pagination.records,
            &self.pagination.next,
            &self.status_markers,
            &self.evidence,
            &self.fields.date_time,
            &self.fields.vehicle_number,
            &self.fields.driver_info,
            &self.fields.fee_text,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_validate() {
        let site = SiteLocators::default();
        for chain in site.chains() {
            assert!(!chain.is_empty(), "{} is empty", chain.name());
            chain.validate().unwrap();
        }
    }

    #[test]
    fn test_question_and_answer_chains() {
        let question = SiteLocators::question("共乘");
        assert_eq!(question.name(), "question:共乘");
        assert_eq!(question.len(), 3);
        SiteLocators::answer("否").validate().unwrap();
    }

    #[test]
    fn test_tables_roundtrip_through_yaml() {
        let site = SiteLocators::default();
        let yaml = serde_yaml_ng::to_string(&site).unwrap();
        let back: SiteLocators = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, site);
    }
}
