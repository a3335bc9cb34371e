//! User-agent classification
//!
//! Ordered rule tables: the first matching pattern names the browser / OS.
//! Anything unmatched is reported as "Unknown"; the device defaults to
//! Desktop unless a tablet or mobile marker is present.

use regex::Regex;
use std::sync::LazyLock;

use crate::analytics::identity::UNKNOWN;
use crate::analytics::models::UserAgentInfo;
use crate::models::DeviceType;

type Rules = Vec<(Regex, &'static str)>;

fn compile(rules: &[(&str, &'static str)]) -> Rules {
    rules
        .iter()
        .map(|(pattern, name)| (Regex::new(pattern).expect("valid user-agent pattern"), *name))
        .collect()
}

// Order matters: in-app and derivative browsers embed the Chrome/Safari tokens
// of the engine they wrap, so they are listed before it. Names follow the
// conventions of ua-parser-js.
static BROWSER_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        (r"\bFBAN/|\bFBAV/|\bFB_IAB/", "Facebook"),
        (r"\bInstagram\b", "Instagram"),
        (r"\bMicroMessenger/", "WeChat"),
        (r"\bLine/", "Line"),
        (r"\bSnapchat\b", "Snapchat"),
        (r"\bElectron/", "Electron"),
        (r"\bOpera Mini/", "Opera Mini"),
        (r"\bOPT/", "Opera Touch"),
        (r"\bOPR/|\bOpera\b", "Opera"),
        (r"\bEdg(?:e|A|iOS)?/", "Edge"),
        (r"\bYaBrowser/", "Yandex"),
        (r"\bVivaldi/", "Vivaldi"),
        (r"\bUCBrowser/|\bUCWEB\b", "UCBrowser"),
        (r"\bDuckDuckGo/|\bDdg/", "DuckDuckGo"),
        (r"\bSilk/", "Silk"),
        (r"\bSamsungBrowser/", "Samsung Internet"),
        (r"\bMiuiBrowser/", "MIUI Browser"),
        (r"\bHuaweiBrowser/", "Huawei Browser"),
        (r"\bFirefox/|\bFxiOS/", "Firefox"),
        (r"\bIEMobile\b", "IEMobile"),
        (r"\bMSIE |\bTrident/", "IE"),
        (r"\bChromium/", "Chromium"),
        (r"\bHeadlessChrome/", "Chrome Headless"),
        (r"; wv\).*\bChrome/", "Chrome WebView"),
        (r"\bChrome/|\bCriOS/", "Chrome"),
        (r"\bAndroid\b.*\bVersion/.*\bSafari/", "Android Browser"),
        (r"\bVersion/.*\bMobile\b.*\bSafari/", "Mobile Safari"),
        (r"\bVersion/.*\bSafari/", "Safari"),
    ])
});

static OS_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        (r"\bWindows Phone\b", "Windows Phone"),
        (r"\bWindows\b", "Windows"),
        (r"\b(?:iPhone|iPad|iPod)\b", "iOS"),
        (r"\bHarmonyOS\b", "HarmonyOS"),
        (r"\bKAIOS\b", "KaiOS"),
        (r"\bTizen\b", "Tizen"),
        (r"\bAndroid\b", "Android"),
        (r"\bBlackBerry\b|\bBB10\b", "BlackBerry"),
        (r"\bCrOS\b", "Chrome OS"),
        (r"\bMac OS X\b|\bMacintosh\b", "Mac OS"),
        (r"\bUbuntu\b", "Ubuntu"),
        (r"\bFedora\b", "Fedora"),
        (r"\bDebian\b", "Debian"),
        (r"\bFreeBSD\b", "FreeBSD"),
        (r"\bOpenBSD\b", "OpenBSD"),
        (r"\bLinux\b|\bX11\b", "Linux"),
    ])
});

static TABLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\biPad\b|\bTablet\b|\bPlayBook\b|\bKindle\b|\bSilk/|\bKF[A-Z]{2,4}\b|\bNexus (?:7|9|10)\b")
        .expect("valid user-agent pattern")
});

static MOBILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Mobi|\biPhone\b|\biPod\b|\bWindows Phone\b|\bBlackBerry\b|\bBB10\b|\bOpera Mini\b|IEMobile|\bKAIOS\b")
        .expect("valid user-agent pattern")
});

static ANDROID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bAndroid\b").expect("valid user-agent pattern"));

fn first_match(rules: &Rules, user_agent: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|(pattern, _)| pattern.is_match(user_agent))
        .map(|(_, name)| *name)
}

fn device_type(user_agent: &str) -> DeviceType {
    let mobile = MOBILE.is_match(user_agent);
    // Android tablets drop the "Mobile" token
    if TABLET.is_match(user_agent) || (ANDROID.is_match(user_agent) && !mobile) {
        DeviceType::Tablet
    } else if mobile {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// Classify a raw `User-Agent` header value. Never fails.
pub fn classify(user_agent: &str) -> UserAgentInfo {
    let user_agent = user_agent.trim();

    UserAgentInfo {
        browser: first_match(&BROWSER_RULES, user_agent)
            .unwrap_or(UNKNOWN)
            .to_string(),
        os: first_match(&OS_RULES, user_agent)
            .unwrap_or(UNKNOWN)
            .to_string(),
        device_type: device_type(user_agent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const CHROME_ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.43 Mobile Safari/537.36";
    const CHROME_ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.43 Safari/537.36";
    const FIREFOX_UBUNTU: &str = "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAMSUNG_PHONE: &str = "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/23.0 Chrome/115.0.0.0 Mobile Safari/537.36";

    fn check(ua: &str, browser: &str, os: &str, device: DeviceType) {
        let info = classify(ua);
        assert_eq!(info.browser, browser, "browser for {ua}");
        assert_eq!(info.os, os, "os for {ua}");
        assert_eq!(info.device_type, device, "device for {ua}");
    }

    #[test]
    fn test_desktop_browsers() {
        check(CHROME_WINDOWS, "Chrome", "Windows", DeviceType::Desktop);
        check(EDGE_WINDOWS, "Edge", "Windows", DeviceType::Desktop);
        check(SAFARI_MAC, "Safari", "Mac OS", DeviceType::Desktop);
        check(FIREFOX_LINUX, "Firefox", "Linux", DeviceType::Desktop);
        check(FIREFOX_UBUNTU, "Firefox", "Ubuntu", DeviceType::Desktop);
    }

    #[test]
    fn test_mobile_browsers() {
        check(SAFARI_IPHONE, "Mobile Safari", "iOS", DeviceType::Mobile);
        check(CHROME_ANDROID_PHONE, "Chrome", "Android", DeviceType::Mobile);
        check(SAMSUNG_PHONE, "Samsung Internet", "Android", DeviceType::Mobile);
    }

    #[test]
    fn test_tablets() {
        check(SAFARI_IPAD, "Mobile Safari", "iOS", DeviceType::Tablet);
        check(CHROME_ANDROID_TABLET, "Chrome", "Android", DeviceType::Tablet);
    }

    #[test]
    fn test_opera_variants() {
        check(
            "Opera/9.80 (J2ME/MIDP; Opera Mini/9.80 (S60; SymbOS; Opera Mobi/23.348; U; en) Presto/2.5.25 Version/10.54",
            "Opera Mini",
            UNKNOWN,
            DeviceType::Mobile,
        );
        check(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0",
            "Opera",
            "Windows",
            DeviceType::Desktop,
        );
    }

    #[test]
    fn test_in_app_browsers() {
        check(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 [FBAN/FBIOS;FBAV/442.0.0.38.115;FBBV/540118434]",
            "Facebook",
            "iOS",
            DeviceType::Mobile,
        );
        check(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8 Build/UQ1A.240105.004; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/120.0.6099.144 Mobile Safari/537.36 Instagram 312.1.0.34.111 Android",
            "Instagram",
            "Android",
            DeviceType::Mobile,
        );
        check(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 MicroMessenger/8.0.42(0x18002a2c) NetType/WIFI Language/zh_CN",
            "WeChat",
            "iOS",
            DeviceType::Mobile,
        );
    }

    #[test]
    fn test_engine_derivatives() {
        check(
            "Mozilla/5.0 (Linux; Android 10; K; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/120.0.6099.144 Mobile Safari/537.36",
            "Chrome WebView",
            "Android",
            DeviceType::Mobile,
        );
        check(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.6099.28 Safari/537.36",
            "Chrome Headless",
            "Linux",
            DeviceType::Desktop,
        );
        check(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 YaBrowser/23.11.0.0 Safari/537.36",
            "Yandex",
            "Windows",
            DeviceType::Desktop,
        );
        check(
            "Mozilla/5.0 (Linux; U; Android 4.0.3; en-us; GT-I9100 Build/IML74K) AppleWebKit/534.30 (KHTML, like Gecko) Version/4.0 Mobile Safari/534.30",
            "Android Browser",
            "Android",
            DeviceType::Mobile,
        );
    }

    #[test]
    fn test_kindle_fire_is_tablet() {
        check(
            "Mozilla/5.0 (Linux; Android 9; KFMAWI) AppleWebKit/537.36 (KHTML, like Gecko) Silk/120.4.1 like Chrome/120.0.6099.230 Safari/537.36",
            "Silk",
            "Android",
            DeviceType::Tablet,
        );
    }

    #[test]
    fn test_empty_and_garbage_fall_back_to_unknown_desktop() {
        check("", UNKNOWN, UNKNOWN, DeviceType::Desktop);
        check("   ", UNKNOWN, UNKNOWN, DeviceType::Desktop);
        check("curl/8.4.0", UNKNOWN, UNKNOWN, DeviceType::Desktop);
    }
}
