//! The booking tool set.
//!
//! [`BookingTools`] is the default [`ToolExecutor`]: it answers availability
//! questions from the [`Calendar`], finalises bookings (with a re-check of the
//! slot right before the event is created), and sends client and owner
//! messages over WhatsApp with an SMS fallback. When a [`Mailer`] is set the
//! owner also gets an e-mail per order.

use crate::calendar::{self, Calendar, CalendarEvent};
use crate::declarations::{
    CHECK_YACHT_AVAILABILITY, REQUEST_CANCELLATION, SAVE_CLIENT_DATA, SEND_BOOKING_CONFIRMATION,
    SEND_CLOSING_PROCESS_INFO, SEND_WHATSAPP_MESSAGE, TRANSFER_TO_SUPPORT,
};
use crate::error::ToolError;
use crate::executor::ToolExecutor;
use crate::mail::{Mailer, OrderNotice};
use crate::orders::OrderCounter;
use async_trait::async_trait;
use serde_json::Value;
use skipper_types::{ToolInvocation, ToolOutput};
use skipper_voice::MessageSender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DEPOSIT: u64 = 500;

const DEFAULT_PARTICIPANTS: &str = "13";
const DEFAULT_MEETING_POINT: &str = "מרינה";

const SMS_FALLBACK_PREFILL: &str =
    "היי, דיברנו עכשיו בטלפון. אשמח לקבל את הפרטים והתמונות שביקשתי.";

const CLOSING_PROCESS_TEXT: &str = "*תהליך סגירת עסקה / שריון מקום* ⚓

כדי לשריין את היאכטה, עלינו לבצע הזמנה מסודרת.
אשלח לך כעת *אישור הזמנה* הכולל את כל הפרטים וקישור לתשלום מקדמה.

לאחר התשלום, יש לשלוח לנו צילום אסמכתא בווטסאפ.
*האם לשלוח לך את ההזמנה?*";

const TERMS_TEXT: &str = "*תנאי הזמנה ותנאי ביטול*

1. *הגעה בזמן:* יש להגיע בשעה הנקובה. איחור יקוזז מזמן השייט.
2. *רחצה בים:* ירידה למים רק באישור סקיפר.
3. *מזג אוויר:* במידה וסוער, השייט יידחה למועד אחר.
4. *ביטול:* עד 14 יום החזר מלא פחות 300 ₪, עד 48 שעות 50% דמי ביטול, פחות מ-48 שעות תשלום מלא.

*אישור:* תשלום המקדמה מהווה הסכמה לתנאים.";

/// Business settings the booking tools need.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    /// Receives new-order and cancellation alerts.
    pub owner_phone: String,
    /// Card payment link used when the model does not supply one.
    pub payment_link: String,
    pub deposit: u64,
    /// The business WhatsApp number, used to build `wa.me` links.
    pub business_number: String,
    /// Pause between consecutive client messages so they arrive in order.
    pub message_gap: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            owner_phone: String::new(),
            payment_link: String::new(),
            deposit: DEFAULT_DEPOSIT,
            business_number: String::new(),
            message_gap: Duration::from_secs(1),
        }
    }
}

/// Fields of a `send_booking_confirmation` call.
#[derive(Debug)]
struct BookingRequest<'a> {
    client_name: &'a str,
    client_phone: &'a str,
    date: &'a str,
    start_time: &'a str,
    duration_hours: f64,
    yacht: &'a str,
    total_price: f64,
    participants: Option<&'a str>,
    location_link: Option<&'a str>,
    location_desc: Option<&'a str>,
    payment_link: Option<&'a str>,
    guide_link: Option<&'a str>,
}

fn required_str<'a>(invocation: &'a ToolInvocation, key: &str) -> Result<&'a str, ToolError> {
    invocation
        .str_arg(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ToolError::InvalidArguments(format!("{} requires `{}`", invocation.name, key))
        })
}

/// Accepts numbers sent either as JSON numbers or numeric strings.
fn required_number(invocation: &ToolInvocation, key: &str) -> Result<f64, ToolError> {
    let value = invocation.args.get(key);
    value
        .and_then(Value::as_f64)
        .or_else(|| value.and_then(Value::as_str).and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            ToolError::InvalidArguments(format!("{} requires numeric `{}`", invocation.name, key))
        })
}

fn optional_str<'a>(invocation: &'a ToolInvocation, key: &str) -> Option<&'a str> {
    invocation
        .str_arg(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Formats a number without a trailing `.0` when it is whole.
fn display_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Builds a `wa.me` deep link that opens a chat with `number` pre-filled
/// with `text`.
pub fn wa_me_link(number: &str, text: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
    format!("https://wa.me/{}?text={}", digits, encoded)
}

pub struct BookingTools {
    calendar: Arc<dyn Calendar>,
    sender: Arc<dyn MessageSender>,
    orders: Arc<OrderCounter>,
    mailer: Option<Arc<dyn Mailer>>,
    settings: BookingSettings,
}

impl BookingTools {
    pub fn new(
        calendar: Arc<dyn Calendar>,
        sender: Arc<dyn MessageSender>,
        orders: Arc<OrderCounter>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            calendar,
            sender,
            orders,
            mailer: None,
            settings,
        }
    }

    /// Also e-mails the owner about new orders and cancellations.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Sends over WhatsApp; if that fails, sends an SMS pointing the client
    /// at WhatsApp. Delivery failures are logged, never returned.
    pub async fn send_with_fallback(&self, phone: &str, text: &str) {
        if self.sender.send_whatsapp(phone, text).await.is_ok() {
            return;
        }
        warn!(to = phone, "whatsapp failed, sending sms fallback");
        let link = wa_me_link(&self.settings.business_number, SMS_FALLBACK_PREFILL);
        let body = format!(
            "Leader: שלחנו לך פרטים בוואטסאפ. אם לא קיבלת, לחץ כאן: {}",
            link
        );
        if let Err(e) = self.sender.send_sms(phone, &body).await {
            warn!(to = phone, error = %e, "sms fallback failed");
        }
    }

    async fn notify_owner(&self, text: &str) {
        if self.settings.owner_phone.is_empty() {
            return;
        }
        if let Err(e) = self.sender.send_whatsapp(&self.settings.owner_phone, text).await {
            warn!(error = %e, "owner notification failed");
        }
    }

    async fn mail_owner(&self, notice: OrderNotice) {
        let Some(mailer) = &self.mailer else {
            return;
        };
        if let Err(e) = mailer.send_order_email(&notice).await {
            warn!(error = %e, "owner e-mail failed");
        }
    }

    async fn pause_between_messages(&self) {
        if !self.settings.message_gap.is_zero() {
            tokio::time::sleep(self.settings.message_gap).await;
        }
    }

    async fn check_availability(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let raw_date = required_str(invocation, "date")?;
        let duration_hours = required_number(invocation, "duration")?;
        let yacht = required_str(invocation, "yachtName")?;

        let date = calendar::parse_date(raw_date)
            .ok_or_else(|| ToolError::InvalidArguments(format!("unrecognised date `{}`", raw_date)))?;
        let duration = calendar::hours(duration_hours).ok_or_else(|| {
            ToolError::InvalidArguments(format!("invalid duration {}", duration_hours))
        })?;

        let slots =
            calendar::check_availability(self.calendar.as_ref(), date, duration, yacht).await?;
        if slots.is_empty() {
            return Ok(ToolOutput::Result("אין שעות פנויות.".to_string()));
        }
        let listed: Vec<String> = slots.iter().map(|s| s.display_text()).collect();
        Ok(ToolOutput::Result(format!(
            "שעות פנויות: {}",
            listed.join(", ")
        )))
    }

    async fn confirm_booking(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let request = BookingRequest {
            client_name: required_str(invocation, "clientName")?,
            client_phone: required_str(invocation, "clientPhone")?,
            date: required_str(invocation, "date")?,
            start_time: required_str(invocation, "startTime")?,
            duration_hours: required_number(invocation, "duration")?,
            yacht: required_str(invocation, "yachtName")?,
            total_price: required_number(invocation, "totalPrice")?,
            participants: optional_str(invocation, "participants"),
            location_link: optional_str(invocation, "locationLink"),
            location_desc: optional_str(invocation, "locationDesc"),
            payment_link: optional_str(invocation, "paymentLink"),
            guide_link: optional_str(invocation, "guideLink"),
        };

        let date = calendar::parse_date(request.date).ok_or_else(|| {
            ToolError::InvalidArguments(format!("unrecognised date `{}`", request.date))
        })?;
        let start_time = calendar::parse_time(request.start_time).ok_or_else(|| {
            ToolError::InvalidArguments(format!("unrecognised time `{}`", request.start_time))
        })?;
        let duration = calendar::hours(request.duration_hours).ok_or_else(|| {
            ToolError::InvalidArguments(format!("invalid duration {}", request.duration_hours))
        })?;
        let start = date.and_time(start_time);
        let end = start.checked_add_signed(duration).ok_or_else(|| {
            ToolError::InvalidArguments(format!("booking end out of range for {}", start))
        })?;

        if !calendar::is_slot_available(self.calendar.as_ref(), start, end, request.yacht).await? {
            info!(yacht = request.yacht, %start, "slot taken before confirmation");
            return Ok(ToolOutput::Result(
                "שגיאה: הזמן הזה נתפס הרגע על ידי לקוח אחר. אנא נסה שעה אחרת.".to_string(),
            ));
        }

        let order_id = self.orders.allocate()?;

        let event = CalendarEvent {
            summary: format!("{} - {} (#{})", request.yacht, request.client_name, order_id),
            description: format!(
                "Client: {}\nPhone: {}\nDuration: {}h",
                request.client_name,
                request.client_phone,
                display_number(request.duration_hours)
            ),
            start,
            end,
        };
        if let Err(e) = self.calendar.create_event(event).await {
            // The client still gets a confirmation; the owner reconciles.
            warn!(order_id, error = %e, "calendar event creation failed");
        }

        let date_text = date.format("%d.%m.%Y").to_string();
        let time_text = format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"));

        let mut messages = vec![self.booking_summary(&request, order_id, &date_text, &time_text)];
        messages.push(self.payment_instructions(&request, order_id));
        if let Some(link) = request.location_link {
            messages.push(format!(
                "📍 *הוראות הגעה:*\n{}\n\nלניווט בוייז:\n{}",
                request.location_desc.unwrap_or(DEFAULT_MEETING_POINT),
                link
            ));
        }
        messages.push(TERMS_TEXT.to_string());

        for (i, message) in messages.iter().enumerate() {
            if i > 0 {
                self.pause_between_messages().await;
            }
            self.send_with_fallback(request.client_phone, message).await;
        }

        self.notify_owner(&format!(
            "💰 *הזמנה חדשה #{}*\n{}, {}, {}",
            order_id, request.client_name, request.yacht, date_text
        ))
        .await;
        self.mail_owner(OrderNotice {
            order_id: Some(order_id),
            client_name: request.client_name.to_string(),
            client_phone: request.client_phone.to_string(),
            yacht: request.yacht.to_string(),
            date: date_text.clone(),
            start_time: request.start_time.to_string(),
            total_price: display_number(request.total_price),
            status: None,
        })
        .await;

        info!(order_id, yacht = request.yacht, "booking confirmed");
        Ok(ToolOutput::Result(format!(
            "הזמנה #{} נוצרה בהצלחה.",
            order_id
        )))
    }

    fn booking_summary(
        &self,
        request: &BookingRequest<'_>,
        order_id: u64,
        date_text: &str,
        time_text: &str,
    ) -> String {
        let mut bonuses = String::from("✅ בלונים בתוך היאכטה\n✅ שלט \"מזל טוב\"\n✅ מים");
        let mut swimming = "";
        if request.duration_hours >= 3.0 {
            bonuses = format!("🍾 בקבוק שמפניה (מתנה!)\n{}", bonuses);
            swimming = "\n🏊 אפשרות לירידה למים (באישור סקיפר)";
        }
        format!(
            "לכבוד: {name}\n*אישור הזמנת שייט ביאכטה* ⚓\nמספר הזמנה: *{order}*\n\n\
             📅 *תאריך:* {date}\n⏰ *שעה:* {time} (סה\"כ {hours} שעות)\n⛵ *יאכטה:* {yacht}\n\
             👥 *משתתפים:* עד {participants} איש\n\n📍 *מקום מפגש:*\n{place}\n\n\
             🎁 *החבילה כוללת:*\n{bonuses}{swimming}",
            name = request.client_name,
            order = order_id,
            date = date_text,
            time = time_text,
            hours = display_number(request.duration_hours),
            yacht = request.yacht,
            participants = request.participants.unwrap_or(DEFAULT_PARTICIPANTS),
            place = request.location_desc.unwrap_or(DEFAULT_MEETING_POINT),
            bonuses = bonuses,
            swimming = swimming,
        )
    }

    fn payment_instructions(&self, request: &BookingRequest<'_>, order_id: u64) -> String {
        let deposit = self.settings.deposit as f64;
        let balance = (request.total_price - deposit).max(0.0);
        let link = request.payment_link.unwrap_or(self.settings.payment_link.as_str());
        let guide = request
            .guide_link
            .map(|g| format!("\n(מצורף מדריך: {})", g))
            .unwrap_or_default();
        format!(
            "💰 *הסדרת תשלום עבור הזמנה #{order}*\n\nסה\"כ לתשלום: {total} ₪\n\
             *מקדמה נדרשת כעת: {deposit} ₪*\n\nכרטיס אשראי:\n{link}{guide}\n\n\
             *היתרה ({balance} ₪) תשולם במועד ההפלגה.*\n\
             ⚠️ תשלום המקדמה מהווה אישור לתנאי ההזמנה. נא לשלוח צילום אסמכתא לאחר התשלום.",
            order = order_id,
            total = display_number(request.total_price),
            deposit = self.settings.deposit,
            link = link,
            guide = guide,
            balance = display_number(balance),
        )
    }

    async fn request_cancellation(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutput, ToolError> {
        let order_id = required_str(invocation, "orderId")?;
        let phone = required_str(invocation, "clientPhone")?;

        self.send_with_fallback(
            phone,
            &format!("🚫 בקשה לביטול הזמנה {} התקבלה.", order_id),
        )
        .await;
        let alert = format!(
            "❌ בקשת ביטול: הלקוח {} מבקש לבטל את הזמנה #{}",
            phone, order_id
        );
        self.notify_owner(&alert).await;
        self.mail_owner(OrderNotice {
            client_name: "CANCEL REQUEST".to_string(),
            client_phone: phone.to_string(),
            date: "N/A".to_string(),
            status: Some(alert),
            ..OrderNotice::default()
        })
        .await;
        Ok(ToolOutput::Result("Cancellation request sent.".to_string()))
    }
}

#[async_trait]
impl ToolExecutor for BookingTools {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        info!(tool = %invocation.name, "executing tool");
        match invocation.name.as_str() {
            CHECK_YACHT_AVAILABILITY => self.check_availability(invocation).await,
            TRANSFER_TO_SUPPORT => Ok(ToolOutput::TransferToOperator),
            SEND_WHATSAPP_MESSAGE => {
                let body = required_str(invocation, "messageBody")?;
                let phone = required_str(invocation, "clientPhone")?;
                self.send_with_fallback(phone, body).await;
                Ok(ToolOutput::Result("Message sent.".to_string()))
            }
            SEND_CLOSING_PROCESS_INFO => {
                let phone = required_str(invocation, "clientPhone")?;
                self.send_with_fallback(phone, CLOSING_PROCESS_TEXT).await;
                Ok(ToolOutput::Result("Message sent.".to_string()))
            }
            SEND_BOOKING_CONFIRMATION => self.confirm_booking(invocation).await,
            REQUEST_CANCELLATION => self.request_cancellation(invocation).await,
            SAVE_CLIENT_DATA => {
                let name = required_str(invocation, "name")?;
                Ok(ToolOutput::Result(format!("Saved: {}", name)))
            }
            other => {
                warn!(tool = other, "unknown tool requested");
                Ok(ToolOutput::Error("Function not implemented.".to_string()))
            }
        }
    }
}
