//! Built-in travel passes

use super::TravelPass;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(super) fn builtin_passes() -> Vec<TravelPass> {
    vec![
        TravelPass {
            id: "hiroshima-wide-pass".to_string(),
            name: "広島ワイドパス".to_string(),
            description: "広島エリアのJR線・路面電車が乗り放題".to_string(),
            area: "広島".to_string(),
            price: 3000,
            valid_days: 2,
            features: strings(&[
                "JR西日本（広島エリア）乗り放題",
                "広島電鉄（路面電車）乗り放題",
                "宮島フェリー乗船可",
            ]),
            url: "https://www.jr-odekake.net/railroad/ticket/tokutoku/tabiwa/hiroshima-wide/"
                .to_string(),
            keywords: strings(&["広島", "宮島", "路面電車", "フリーパス"]),
        },
        TravelPass {
            id: "kansai-wide-pass".to_string(),
            name: "関西ワイドパス".to_string(),
            description: "関西エリアを広くカバーするフリーパス".to_string(),
            area: "関西".to_string(),
            price: 10000,
            valid_days: 5,
            features: strings(&[
                "JR西日本（関西エリア）乗り放題",
                "新幹線（新大阪〜岡山間）利用可",
                "特急列車の自由席利用可",
            ]),
            url: "https://www.jr-odekake.net/railroad/ticket/tokutoku/tabiwa/kansai-wide/"
                .to_string(),
            keywords: strings(&["関西", "大阪", "京都", "神戸", "姫路", "新幹線"]),
        },
        TravelPass {
            id: "okayama-kurashiki-pass".to_string(),
            name: "岡山・倉敷パス".to_string(),
            description: "岡山と倉敷を満喫できる1日パス".to_string(),
            area: "岡山".to_string(),
            price: 2000,
            valid_days: 1,
            features: strings(&[
                "JR西日本（岡山〜倉敷間）乗り放題",
                "倉敷美観地区へのアクセスに便利",
                "路線バス一部区間利用可",
            ]),
            url: "https://www.jr-odekake.net/railroad/ticket/tokutoku/tabiwa/okayama-kurashiki/"
                .to_string(),
            keywords: strings(&["岡山", "倉敷", "美観地区"]),
        },
        TravelPass {
            id: "san-in-pass".to_string(),
            name: "山陰観光パス".to_string(),
            description: "山陰地方を周遊できるお得なパス".to_string(),
            area: "山陰".to_string(),
            price: 5000,
            valid_days: 3,
            features: strings(&[
                "JR西日本（山陰エリア）乗り放題",
                "鳥取砂丘、出雲大社へのアクセスに最適",
                "特急列車の自由席利用可",
            ]),
            url: "https://www.jr-odekake.net/railroad/ticket/tokutoku/tabiwa/sanin/".to_string(),
            keywords: strings(&["山陰", "鳥取", "島根", "出雲大社", "鳥取砂丘"]),
        },
        TravelPass {
            id: "kyoto-osaka-pass".to_string(),
            name: "京都・大阪観光パス".to_string(),
            description: "京都と大阪を効率よく観光できるパス".to_string(),
            area: "京都・大阪".to_string(),
            price: 4500,
            valid_days: 2,
            features: strings(&[
                "JR西日本（京都・大阪エリア）乗り放題",
                "主要観光地へのアクセス抜群",
                "市営地下鉄一部区間利用可",
            ]),
            url: "https://www.jr-odekake.net/railroad/ticket/tokutoku/tabiwa/kyoto-osaka/"
                .to_string(),
            keywords: strings(&["京都", "大阪", "観光", "寺社"]),
        },
    ]
}
