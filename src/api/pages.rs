use crate::application::{PaymentForm, PaymentPage};
use crate::domain::errors::DomainError;
use crate::domain::HostedPage;
use axum::http::StatusCode;
use axum::response::Html;

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; background: #f4f4f4; display: flex; justify-content: center; align-items: center; min-height: 100vh; margin: 0; }
.container { background: white; padding: 40px; border-radius: 10px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); text-align: center; max-width: 500px; width: 100%; }
h1 { margin-bottom: 15px; }
label { display: block; text-align: left; margin-top: 12px; color: #555; }
input { width: 100%; padding: 10px; margin-top: 4px; box-sizing: border-box; border: 1px solid #ccc; border-radius: 5px; }
input[readonly] { background: #eee; }
.btn { background: #af100a; color: white; padding: 12px 20px; border: none; border-radius: 5px; margin-top: 20px; width: 100%; cursor: pointer; font-size: 16px; }
.summary { color: #666; margin-bottom: 10px; }
.error { color: #af100a; margin-top: 12px; min-height: 1em; }
"#;

/// HTML转义
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>"#,
        title = escape(title),
        style = STYLE,
    ))
}

/// 付款页面：自动跳转或付款表单
pub fn payment_page(page: &PaymentPage) -> Html<String> {
    match page {
        PaymentPage::AutoRedirect { hosted_page } => redirect_page(hosted_page),
        PaymentPage::Form(form) => form_page(form),
    }
}

fn redirect_page(hosted_page: &HostedPage) -> Html<String> {
    let body = format!(
        r#"        <h1>Redirecting to secure payment...</h1>
        <form id="hosted" method="post" action="{post_url}">
            <input type="hidden" name="token" value="{form_token}">
            <noscript><button class="btn" type="submit">Continue</button></noscript>
        </form>
        <script>document.getElementById("hosted").submit();</script>"#,
        post_url = escape(&hosted_page.post_url),
        form_token = escape(&hosted_page.form_token),
    );
    layout("Secure Payment", &body)
}

fn form_page(form: &PaymentForm) -> Html<String> {
    let readonly = if form.amount_editable { "" } else { " readonly" };
    let body = format!(
        r#"        <h1>Secure Payment</h1>
        <p class="summary">{payer}</p>
        <p class="summary">{summary}</p>
        <label for="amount">Amount (USD)</label>
        <input id="amount" type="number" min="0.01" step="0.01" value="{amount}"{readonly}>
        <button class="btn" id="pay" type="button">Pay with card</button>
        <p class="error" id="error"></p>
        <form id="hosted" method="post">
            <input type="hidden" name="token" id="form-token">
        </form>
        <script>
            document.getElementById("pay").addEventListener("click", async function () {{
                const error = document.getElementById("error");
                error.textContent = "";
                const response = await fetch("/api/generate-authorize-link", {{
                    method: "POST",
                    headers: {{ "Content-Type": "application/json" }},
                    body: JSON.stringify({{ token: "{token}", amount: document.getElementById("amount").value }})
                }});
                const result = await response.json();
                if (!response.ok) {{
                    error.textContent = result.message || "Payment could not be started.";
                    return;
                }}
                const hosted = document.getElementById("hosted");
                hosted.action = result.postUrl;
                document.getElementById("form-token").value = result.token;
                hosted.submit();
            }});
        </script>"#,
        payer = escape(&form.payer_name),
        summary = escape(&form.products_summary),
        amount = form.amount,
        token = escape(&form.token),
    );
    layout("Secure Payment", &body)
}

/// 会话错误页面，不显示内部标识
pub fn error_page(error: &DomainError) -> (StatusCode, Html<String>) {
    let (status, title) = match error {
        DomainError::NotFound => (StatusCode::NOT_FOUND, "Invalid Link"),
        DomainError::Expired => (StatusCode::GONE, "Link Expired"),
        DomainError::AlreadyConsumed | DomainError::ChargeInProgress => {
            (StatusCode::CONFLICT, "Payment Already Processed")
        }
        DomainError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid Request"),
        DomainError::UpstreamFailure(_) | DomainError::HttpError(_) => {
            (StatusCode::BAD_GATEWAY, "Payment Unavailable")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Error"),
    };

    let body = format!(
        "        <h1>{}</h1>\n        <p>{}</p>",
        escape(title),
        escape(error.user_message())
    );
    (status, layout(title, &body))
}

pub fn success_page(amount: Option<&str>, transaction_id: Option<&str>) -> Html<String> {
    let mut body = String::from(
        "        <h1>Payment Successful</h1>\n        <p>Thank you. Your payment has been processed.</p>",
    );
    if let Some(amount) = amount.filter(|a| !a.is_empty()) {
        body.push_str(&format!("\n        <p>Amount: ${}</p>", escape(amount)));
    }
    if let Some(transaction_id) = transaction_id.filter(|t| !t.is_empty()) {
        body.push_str(&format!(
            "\n        <p>Transaction: {}</p>",
            escape(transaction_id)
        ));
    }
    layout("Payment Successful", &body)
}

pub fn failed_page() -> Html<String> {
    layout(
        "Payment Failed",
        "        <h1>Payment Failed</h1>\n        <p>The payment could not be processed. Please try again.</p>",
    )
}

pub fn cancelled_page() -> Html<String> {
    layout(
        "Payment Cancelled",
        "        <h1>Payment Cancelled</h1>\n        <p>You have cancelled the payment process. You can try again whenever you wish.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Money;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>"x" & 'y'</script>"#),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_form_page_fixed_amount_is_readonly() {
        let form = PaymentForm {
            token: "abc".to_string(),
            payer_name: "<b>Ana</b>".to_string(),
            amount: Money::from_cents(2080),
            amount_editable: false,
            products_summary: "Services".to_string(),
            line_items: Vec::new(),
        };

        let Html(html) = payment_page(&PaymentPage::Form(form));
        assert!(html.contains(r#"value="20.80" readonly"#));
        assert!(html.contains("&lt;b&gt;Ana&lt;/b&gt;"));
    }

    #[test]
    fn test_redirect_page_posts_form_token() {
        let page = PaymentPage::AutoRedirect {
            hosted_page: HostedPage {
                post_url: "https://test.authorize.net/payment/payment".to_string(),
                form_token: "FORM1".to_string(),
            },
        };

        let Html(html) = payment_page(&page);
        assert!(html.contains(r#"action="https://test.authorize.net/payment/payment""#));
        assert!(html.contains(r#"value="FORM1""#));
    }

    #[test]
    fn test_error_page_status() {
        assert_eq!(error_page(&DomainError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(error_page(&DomainError::Expired).0, StatusCode::GONE);

        let (_, Html(html)) = error_page(&DomainError::InternalError("db at 10.0.0.1".to_string()));
        assert!(!html.contains("10.0.0.1"));
    }
}
