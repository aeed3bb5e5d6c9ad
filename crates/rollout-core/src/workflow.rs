//! CI pipeline template.
//!
//! The workflow builds the application's image, pushes it to the GitHub
//! container registry and dispatches a `deploy` event to the repository
//! holding the descriptors.

/// Repository that receives the deploy dispatch by default.
pub const DEFAULT_DEPLOY_REPO: &str = "Kabilan108/rollouts";

/// Branch whose pushes trigger the workflow by default.
pub const DEFAULT_BRANCH: &str = "main";

const TEMPLATE: &str = r#"name: Build and Push to GitHub Container Registry

on:
  workflow_dispatch:
  push:
    branches: [{branch}]

env:
  REGISTRY: ghcr.io
  IMAGE_NAME: ${{ github.repository }}

jobs:
  build-and-push:
    runs-on: ubuntu-latest
    permissions:
      contents: read
      packages: write

    steps:
      - name: Checkout repository
        run: |
          git clone https://github.com/${{ github.repository }}.git .
          git checkout ${{ github.sha }}

      - name: Setup Docker environment
        run: |
          # convert repository name to lowercase for container registry
          echo "IMAGE_NAME_LOWER=$(echo ${{ env.IMAGE_NAME }} | tr '[:upper:]' '[:lower:]')" >> $GITHUB_ENV
          echo "FULL_IMAGE_NAME=${{ env.REGISTRY }}/$(echo ${{ env.IMAGE_NAME }} | tr '[:upper:]' '[:lower:]')" >> $GITHUB_ENV

      - name: Login to GitHub Container Registry
        run: |
          echo "${{ secrets.GITHUB_TOKEN }}" | docker login ${{ env.REGISTRY }} -u ${{ github.actor }} --password-stdin

      - name: Build Docker image
        run: |
          docker build -t ${{ env.FULL_IMAGE_NAME }}:latest .
          docker tag ${{ env.FULL_IMAGE_NAME }}:latest ${{ env.FULL_IMAGE_NAME }}:${{ github.sha }}

      - name: Push Docker image
        run: |
          docker push ${{ env.FULL_IMAGE_NAME }}:latest
          docker push ${{ env.FULL_IMAGE_NAME }}:${{ github.sha }}

      - name: Output image details
        run: |
          echo "Successfully pushed Docker image:"
          echo "- ${{ env.FULL_IMAGE_NAME }}:latest"
          echo "- ${{ env.FULL_IMAGE_NAME }}:${{ github.sha }}"
          echo ""
          echo "To pull this image:"
          echo "docker pull ${{ env.FULL_IMAGE_NAME }}:latest"

      - name: Trigger redeploy
        env:
          DEPLOY_PAT: ${{ secrets.DEPLOY_PAT }}
        run: |
          curl -L -X POST \
            -H "Accept: application/vnd.github+json" \
            -H "Authorization: Bearer $DEPLOY_PAT" \
            -H "X-GitHub-Api-Version: 2022-11-28" \
            https://api.github.com/repos/{deploy_repo}/dispatches \
            -d '{"event_type":"deploy"}'
"#;

/// Renders the workflow for pushes to `branch`, dispatching to
/// `deploy_repo` (`owner/name`).
pub fn github_action(branch: &str, deploy_repo: &str) -> String {
    TEMPLATE
        .replace("{branch}", branch)
        .replace("{deploy_repo}", deploy_repo)
}
